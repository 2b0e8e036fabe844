//! Per-node error accumulator.
//!
//! Each candidate node carries independent boolean flags plus one mutually
//! exclusive "specific" tag. The accumulator is a plain value stored inline
//! in the error map; there is no shared ownership.

/// The specific tag of a node. `Poss*` variants are optimistic guesses made
/// by the node analysis; pass 3 either confirms them (`Rivermouth`,
/// `Outflow`) or `switch_poss` turns them into spring/end errors at final
/// insertion. Once confirmed, a specific is never cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specific {
    None,
    PossRivermouth,
    PossOutflow,
    Rivermouth,
    Outflow,
}

/// Size class of the waterway that made a node a rivermouth/outflow
/// candidate. Not serialised, but kept with the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeHint {
    None,
    River,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorSum {
    direction_error: bool,
    name_error: bool,
    type_error: bool,
    spring_error: bool,
    end_error: bool,
    way_error: bool,
    specific: Specific,
    size: SizeHint,
}

impl Default for ErrorSum {
    fn default() -> Self {
        Self {
            direction_error: false,
            name_error: false,
            type_error: false,
            spring_error: false,
            end_error: false,
            way_error: false,
            specific: Specific::None,
            size: SizeHint::None,
        }
    }
}

impl ErrorSum {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set_direction_error(&mut self) {
        self.direction_error = true;
    }

    pub fn set_name_error(&mut self) {
        self.name_error = true;
    }

    pub fn set_type_error(&mut self) {
        self.type_error = true;
    }

    pub fn set_spring_error(&mut self) {
        self.spring_error = true;
    }

    pub fn set_end_error(&mut self) {
        self.end_error = true;
    }

    pub fn set_way_error(&mut self) {
        self.way_error = true;
    }

    pub fn set_river(&mut self) {
        self.size = SizeHint::River;
    }

    pub fn set_stream(&mut self) {
        self.size = SizeHint::Stream;
    }

    pub fn set_poss_rivermouth(&mut self) {
        self.specific = Specific::PossRivermouth;
    }

    pub fn set_poss_outflow(&mut self) {
        self.specific = Specific::PossOutflow;
    }

    pub fn set_rivermouth(&mut self) {
        self.specific = Specific::Rivermouth;
    }

    pub fn set_outflow(&mut self) {
        self.specific = Specific::Outflow;
    }

    /// Wholesale downgrade to an ordinary node.
    pub fn set_to_normal(&mut self) {
        *self = Default::default();
    }

    /// At final insertion a remaining `possible` specific means no
    /// downgrading evidence arrived: the guessed rivermouth is really a
    /// waterway ending nowhere (end error), the guessed outflow a waterway
    /// starting from nowhere (spring error).
    pub fn switch_poss(&mut self) {
        match self.specific {
            Specific::PossRivermouth => {
                self.end_error = true;
                self.specific = Specific::None;
            }
            Specific::PossOutflow => {
                self.spring_error = true;
                self.specific = Specific::None;
            }
            _ => {}
        }
    }

    pub fn is_normal(&self) -> bool {
        !self.direction_error
            && !self.name_error
            && !self.type_error
            && !self.spring_error
            && !self.end_error
            && !self.way_error
            && self.specific == Specific::None
            && self.size == SizeHint::None
    }

    pub fn is_direction_error(&self) -> bool {
        self.direction_error
    }

    pub fn is_name_error(&self) -> bool {
        self.name_error
    }

    pub fn is_type_error(&self) -> bool {
        self.type_error
    }

    pub fn is_spring_error(&self) -> bool {
        self.spring_error
    }

    pub fn is_end_error(&self) -> bool {
        self.end_error
    }

    pub fn is_way_error(&self) -> bool {
        self.way_error
    }

    pub fn is_poss_rivermouth(&self) -> bool {
        self.specific == Specific::PossRivermouth
    }

    pub fn is_poss_outflow(&self) -> bool {
        self.specific == Specific::PossOutflow
    }

    pub fn is_rivermouth(&self) -> bool {
        self.specific == Specific::Rivermouth
    }

    pub fn is_outflow(&self) -> bool {
        self.specific == Specific::Outflow
    }

    /// Value of the `specific` column; possible tags are never written.
    pub fn specific_label(&self) -> &'static str {
        match self.specific {
            Specific::Rivermouth => "rivermouth",
            Specific::Outflow => "outflow",
            _ => "",
        }
    }
}
