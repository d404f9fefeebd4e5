use super::machine::TryoutMachine;

/// Aggregated view of tryout progress, useful for rendering.
///
/// Plain data, no pre-formatted strings beyond the countdown helper; the
/// presentation layer decides how to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryoutProgress {
    pub section_index: usize,
    pub section_count: usize,
    pub question_index: usize,
    pub question_count: usize,
    pub remaining_secs: u32,
    pub answered: usize,
    pub flagged: usize,
    pub is_complete: bool,
}

impl TryoutProgress {
    #[must_use]
    pub fn of(machine: &TryoutMachine) -> Self {
        let mut answered = 0;
        let mut flagged = 0;
        for question in machine.questions() {
            if let Some(answer) = machine.answer_for(question.id()) {
                if answer.is_answered() {
                    answered += 1;
                }
                if answer.is_flagged() {
                    flagged += 1;
                }
            }
        }
        Self {
            section_index: machine.section_index(),
            section_count: machine.sections().len(),
            question_index: machine.question_index(),
            question_count: machine.questions().len(),
            remaining_secs: machine.remaining_secs(),
            answered,
            flagged,
            is_complete: machine.is_complete(),
        }
    }

    /// Countdown as `MM:SS`.
    #[must_use]
    pub fn format_remaining(&self) -> String {
        let mins = self.remaining_secs / 60;
        let secs = self.remaining_secs % 60;
        format!("{mins:02}:{secs:02}")
    }
}
