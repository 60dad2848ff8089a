//! Facade crate: wires `hobgoblin-runtime`, `hobgoblin-net`,
//! `hobgoblin-sync` and `hobgoblin-config` into one authoritative-server
//! app object, the way `gamecore`/`gamerunner` wire `t51core`/`neutronium`
//! together behind `GameConfig` and a `World`.

pub mod app;
pub mod error;
pub mod sync_wire;

pub use app::SpempeApp;
pub use error::AppError;
