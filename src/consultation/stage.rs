/// Consultation state machine stages
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsultationStage {
    Received,
    RateChecked,
    Identified,
    CreditChecked,
    SessionResolved,
    QuestionPersisted,
    GuidanceFetched,
    AnalysisEnhanced,
    ResponsePersisted,
    Responded,
    RejectedBadInput,
    RejectedRateLimit,
    RejectedNoCredit,
    FailedUpstream,
}

impl ConsultationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStage::Received => "received",
            ConsultationStage::RateChecked => "rate_checked",
            ConsultationStage::Identified => "identified",
            ConsultationStage::CreditChecked => "credit_checked",
            ConsultationStage::SessionResolved => "session_resolved",
            ConsultationStage::QuestionPersisted => "question_persisted",
            ConsultationStage::GuidanceFetched => "guidance_fetched",
            ConsultationStage::AnalysisEnhanced => "analysis_enhanced",
            ConsultationStage::ResponsePersisted => "response_persisted",
            ConsultationStage::Responded => "responded",
            ConsultationStage::RejectedBadInput => "rejected_bad_input",
            ConsultationStage::RejectedRateLimit => "rejected_rate_limit",
            ConsultationStage::RejectedNoCredit => "rejected_no_credit",
            ConsultationStage::FailedUpstream => "failed_upstream",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConsultationStage::Responded
                | ConsultationStage::RejectedBadInput
                | ConsultationStage::RejectedRateLimit
                | ConsultationStage::RejectedNoCredit
                | ConsultationStage::FailedUpstream
        )
    }

    /// Legal successor on the happy path
    fn next(&self) -> Option<ConsultationStage> {
        use ConsultationStage::*;
        match self {
            Received => Some(RateChecked),
            RateChecked => Some(Identified),
            Identified => Some(CreditChecked),
            CreditChecked => Some(SessionResolved),
            SessionResolved => Some(QuestionPersisted),
            QuestionPersisted => Some(GuidanceFetched),
            GuidanceFetched => Some(AnalysisEnhanced),
            AnalysisEnhanced => Some(ResponsePersisted),
            ResponsePersisted => Some(Responded),
            _ => None,
        }
    }
}

impl fmt::Display for ConsultationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs one consultation's progress
#[derive(Debug)]
pub struct StageTracker {
    request_id: String,
    current: ConsultationStage,
}

impl StageTracker {
    pub fn new(request_id: String) -> Self {
        debug!(request_id = %request_id, stage = %ConsultationStage::Received, "Consultation stage");
        Self {
            request_id,
            current: ConsultationStage::Received,
        }
    }

    pub fn current(&self) -> ConsultationStage {
        self.current
    }

    /// Move one step along the happy path
    pub fn advance(&mut self) -> ConsultationStage {
        if let Some(next) = self.current.next() {
            self.current = next;
            debug!(request_id = %self.request_id, stage = %next, "Consultation stage");
        }
        self.current
    }

    /// Enter a terminal failure state
    pub fn fail(&mut self, stage: ConsultationStage) {
        warn!(
            request_id = %self.request_id,
            from = %self.current,
            stage = %stage,
            "Consultation ended without an answer"
        );
        self.current = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_reaches_responded() {
        let mut tracker = StageTracker::new("req".to_string());
        let mut steps = 0;
        while !tracker.current().is_terminal() {
            tracker.advance();
            steps += 1;
        }
        assert_eq!(tracker.current(), ConsultationStage::Responded);
        assert_eq!(steps, 9);
    }

    #[test]
    fn test_terminal_states_do_not_advance() {
        let mut tracker = StageTracker::new("req".to_string());
        tracker.fail(ConsultationStage::RejectedNoCredit);
        assert_eq!(tracker.advance(), ConsultationStage::RejectedNoCredit);
    }
}
