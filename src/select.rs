//! Best-fit selection of the record set to materialize.
//!
//! A file may hold many record sets but only one becomes the actively
//! loaded set when the caller does not ask for a specific one.  The
//! selector is driven once over the full descriptor list BEFORE any body
//! bytes are read, because the winning descriptor may come after others
//! in file order; classification and decoding are separate phases.

use crate::format::truncate_name;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Unfixed,
    Fixed { channel_number: usize, name: String },
}

#[derive(Debug)]
pub struct BestFitSelector {
    /// Caller-requested record-set name, already truncated.  When set,
    /// it is the ONLY rule considered.
    target_name: Option<String>,
    preferred_channel: usize,
    first_choice: bool,
    state: State,
}

impl BestFitSelector {
    pub fn new(
        target_name: Option<&str>,
        preferred_channel: usize,
        first_choice: bool,
    ) -> Self {
        Self {
            target_name: target_name.map(|n| truncate_name(n).to_string()),
            preferred_channel,
            first_choice,
            state: State::Unfixed,
        }
    }

    /// Feed one descriptor, in file order, with its resolved channel.
    /// Returns true when this call fixed the selector.
    pub fn observe(&mut self, channel_number: usize, name: &str) -> bool {
        if matches!(self.state, State::Fixed { .. }) {
            return false;
        }
        let name = truncate_name(name);
        let fixes = match &self.target_name {
            Some(target) => target == name,
            None => self.first_choice || channel_number == self.preferred_channel,
        };
        if fixes {
            self.state = State::Fixed { channel_number, name: name.to_string() };
        }
        fixes
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.state, State::Fixed { .. })
    }

    /// After the classification pass: does this (channel, name) pair
    /// denote the winning record set?
    pub fn is_match(&self, channel_number: usize, name: &str) -> bool {
        match &self.state {
            State::Unfixed => false,
            State::Fixed { channel_number: ch, name: fixed } => {
                *ch == channel_number && fixed == truncate_name(name)
            }
        }
    }
}
