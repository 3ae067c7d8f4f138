//! Decision vector layout
//!
//! The optimiser works on a single flattened vector holding the predicted
//! state trajectory and the actuation sequence. The vector is laid out as six
//! contiguous state blocks of `n` slots each (x, y, psi, v, cte, epsi)
//! followed by two actuation blocks of `n - 1` slots each (steering, then
//! acceleration).
//!
//! The block offsets derived here are the shared invariant between the
//! problem builder, the trajectory model and the actuation extractor. All
//! indexing into decision or constraint vectors must go through this layout.

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Block offsets into the flattened decision vector for a given horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionLayout {
    /// Horizon length in steps
    pub n: usize,

    /// Offset of the x position block
    pub x_start: usize,

    /// Offset of the y position block
    pub y_start: usize,

    /// Offset of the heading block
    pub psi_start: usize,

    /// Offset of the speed block
    pub v_start: usize,

    /// Offset of the cross-track error block
    pub cte_start: usize,

    /// Offset of the heading error block
    pub epsi_start: usize,

    /// Offset of the steering actuation block (`n - 1` slots)
    pub delta_start: usize,

    /// Offset of the acceleration actuation block (`n - 1` slots)
    pub a_start: usize,

    /// Total number of decision variables, `6n + 2(n - 1)`
    pub n_vars: usize,

    /// Total number of constraint rows, `6n`
    pub n_constraints: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DecisionLayout {
    /// Derive the layout for a horizon of `n` steps.
    ///
    /// `n` must be at least 2 (one pinned state plus one free step), which is
    /// enforced by parameter validation before any layout is built.
    pub fn new(n: usize) -> Self {
        let x_start = 0;
        let y_start = x_start + n;
        let psi_start = y_start + n;
        let v_start = psi_start + n;
        let cte_start = v_start + n;
        let epsi_start = cte_start + n;
        let delta_start = epsi_start + n;
        let a_start = delta_start + (n - 1);

        Self {
            n,
            x_start,
            y_start,
            psi_start,
            v_start,
            cte_start,
            epsi_start,
            delta_start,
            a_start,
            n_vars: n * 6 + (n - 1) * 2,
            n_constraints: n * 6,
        }
    }

    /// Offsets of the six state blocks, in decision vector order.
    pub fn state_starts(&self) -> [usize; 6] {
        [
            self.x_start,
            self.y_start,
            self.psi_start,
            self.v_start,
            self.cte_start,
            self.epsi_start,
        ]
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
