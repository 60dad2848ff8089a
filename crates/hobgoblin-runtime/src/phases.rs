/// Bitmask of `Phase`s, as the design notes ask: a closed enum with explicit
/// integer values matching the bitmask passed to `advance_step` (spec.md §9,
/// "Variant state in the active object (`QAO_Event` enum)").
pub type PhaseMask = u32;

/// One of the fourteen event phases a step may run, in their fixed
/// execution order (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    StartFrame = 0,
    PreUpdate = 1,
    BeginUpdate = 2,
    Update1 = 3,
    Update2 = 4,
    EndUpdate = 5,
    PostUpdate = 6,
    PreDraw = 7,
    Draw1 = 8,
    Draw2 = 9,
    DrawGui = 10,
    PostDraw = 11,
    Display = 12,
    EndFrame = 13,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Phase; 14] = [
        Phase::StartFrame,
        Phase::PreUpdate,
        Phase::BeginUpdate,
        Phase::Update1,
        Phase::Update2,
        Phase::EndUpdate,
        Phase::PostUpdate,
        Phase::PreDraw,
        Phase::Draw1,
        Phase::Draw2,
        Phase::DrawGui,
        Phase::PostDraw,
        Phase::Display,
        Phase::EndFrame,
    ];

    #[inline]
    pub const fn bit(self) -> PhaseMask {
        1 << (self as u32)
    }

    /// True for the draw-group phases, which the runtime visits in reverse
    /// (ascending-priority) order so draw commands layer foreground over
    /// background (spec.md §4.1).
    #[inline]
    pub const fn is_draw(self) -> bool {
        matches!(
            self,
            Phase::PreDraw | Phase::Draw1 | Phase::Draw2 | Phase::DrawGui | Phase::PostDraw
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::StartFrame => "START_FRAME",
            Phase::PreUpdate => "PRE_UPDATE",
            Phase::BeginUpdate => "BEGIN_UPDATE",
            Phase::Update1 => "UPDATE_1",
            Phase::Update2 => "UPDATE_2",
            Phase::EndUpdate => "END_UPDATE",
            Phase::PostUpdate => "POST_UPDATE",
            Phase::PreDraw => "PRE_DRAW",
            Phase::Draw1 => "DRAW_1",
            Phase::Draw2 => "DRAW_2",
            Phase::DrawGui => "DRAW_GUI",
            Phase::PostDraw => "POST_DRAW",
            Phase::Display => "DISPLAY",
            Phase::EndFrame => "END_FRAME",
        }
    }
}

/// The standard loop's non-draw group: run repeatedly for catch-up ticks
/// (spec.md §4.9).
pub const NON_DRAW_MASK: PhaseMask = Phase::StartFrame.bit()
    | Phase::PreUpdate.bit()
    | Phase::BeginUpdate.bit()
    | Phase::Update1.bit()
    | Phase::Update2.bit()
    | Phase::EndUpdate.bit()
    | Phase::PostUpdate.bit();

/// The standard loop's draw group: run once per frame after catch-up.
pub const DRAW_MASK: PhaseMask = Phase::PreDraw.bit()
    | Phase::Draw1.bit()
    | Phase::Draw2.bit()
    | Phase::DrawGui.bit()
    | Phase::PostDraw.bit();

pub const DISPLAY_MASK: PhaseMask = Phase::Display.bit();

pub const END_FRAME_MASK: PhaseMask = Phase::EndFrame.bit();

pub const ALL_MASK: PhaseMask = NON_DRAW_MASK | DRAW_MASK | DISPLAY_MASK | END_FRAME_MASK;
