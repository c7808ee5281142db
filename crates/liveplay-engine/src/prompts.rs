//! Round prompt sourcing: the generative-content contract.
//!
//! The content service is an external collaborator. The engine only needs
//! the narrow contract in [`PromptProvider`]: given an industry, category,
//! and difficulty, return a prompt, the correct target, and distractors.
//!
//! Availability matters more than freshness here — a malformed or
//! unavailable response must degrade to the built-in static set rather
//! than stall a round start. [`Degrading`] implements that fallback.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use liveplay_protocol::TargetId;

use crate::BingoGrid;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Difficulty requested from the content provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// What the engine asks the provider for.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub industry: String,
    pub category: Option<String>,
    pub difficulty: Difficulty,
}

impl Default for PromptRequest {
    fn default() -> Self {
        Self {
            industry: "technology".into(),
            category: None,
            difficulty: Difficulty::Medium,
        }
    }
}

/// One round's worth of content.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundPrompt {
    pub prompt: String,
    pub correct_target: TargetId,
    pub distractors: Vec<TargetId>,
    pub category: Option<String>,
}

impl RoundPrompt {
    /// All selectable targets this round, correct one included, in id
    /// order so the ordering leaks nothing.
    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets = self.distractors.clone();
        targets.push(self.correct_target);
        targets.sort();
        targets.dedup();
        targets
    }

    /// Checks the provider response against the grid the game plays on.
    pub fn validate(&self, grid: &BingoGrid) -> Result<(), PromptError> {
        if self.prompt.trim().is_empty() {
            return Err(PromptError::Malformed("empty prompt text".into()));
        }
        if !grid.contains(self.correct_target) {
            return Err(PromptError::Malformed(format!(
                "correct target {} is off the {}x{} grid",
                self.correct_target,
                grid.side(),
                grid.side()
            )));
        }
        if self.distractors.is_empty() {
            return Err(PromptError::Malformed("no distractors".into()));
        }
        if self.distractors.contains(&self.correct_target) {
            return Err(PromptError::Malformed(
                "correct target duplicated among distractors".into(),
            ));
        }
        if let Some(bad) = self.distractors.iter().find(|t| !grid.contains(**t)) {
            return Err(PromptError::Malformed(format!(
                "distractor {bad} is off the grid"
            )));
        }
        Ok(())
    }
}

/// Errors a prompt provider can return.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The provider could not be reached or returned a failure.
    #[error("prompt provider unavailable: {0}")]
    Unavailable(String),

    /// The provider responded with content that fails validation.
    #[error("malformed prompt: {0}")]
    Malformed(String),
}

/// The generative-content contract.
pub trait PromptProvider: Send + Sync + 'static {
    fn next_prompt(
        &self,
        request: &PromptRequest,
    ) -> impl Future<Output = Result<RoundPrompt, PromptError>> + Send;
}

// ---------------------------------------------------------------------------
// StaticPromptSet
// ---------------------------------------------------------------------------

/// Career-challenge prompt texts for the built-in fallback set, one per
/// grid cell (cycled when the grid is larger).
const CAREER_PROMPTS: &[&str] = &[
    "Which role owns the company-wide vision and answers to the board?",
    "Who signs off on the annual budget and the quarterly forecast?",
    "Which role runs the brand campaign for the product launch?",
    "Who decides the architecture for the new platform migration?",
    "Which role designs the hiring plan for the new office?",
    "Who presents the earnings call alongside the analysts?",
    "Which role negotiates the cloud vendor contract renewal?",
    "Who owns the employee-engagement survey results?",
    "Which role approves the go-to-market pricing experiment?",
];

/// A fixed, always-available prompt set cycled round-robin.
///
/// Serves two jobs: the fallback behind [`Degrading`], and a perfectly
/// good standalone provider for demos and tests.
pub struct StaticPromptSet {
    prompts: Vec<RoundPrompt>,
    cursor: AtomicUsize,
}

impl StaticPromptSet {
    pub fn new(prompts: Vec<RoundPrompt>) -> Self {
        Self {
            prompts,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Builds the built-in career set sized to the given grid: the prompt
    /// for cell `i` has correct target `i` and neighboring distractors.
    pub fn career_defaults(grid: &BingoGrid) -> Self {
        let cells = grid.cell_count();
        let prompts = (0..cells)
            .map(|i| {
                let text = CAREER_PROMPTS[i as usize % CAREER_PROMPTS.len()];
                RoundPrompt {
                    prompt: text.to_string(),
                    correct_target: TargetId(i),
                    distractors: vec![
                        TargetId((i + 1) % cells),
                        TargetId((i + 2) % cells),
                        TargetId((i + 3) % cells),
                    ],
                    category: None,
                }
            })
            .collect();
        Self::new(prompts)
    }

    /// Next prompt in rotation. Infallible by construction.
    pub fn next(&self) -> RoundPrompt {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.prompts.len();
        self.prompts[idx].clone()
    }
}

impl PromptProvider for StaticPromptSet {
    async fn next_prompt(&self, _request: &PromptRequest) -> Result<RoundPrompt, PromptError> {
        Ok(self.next())
    }
}

// ---------------------------------------------------------------------------
// Degrading
// ---------------------------------------------------------------------------

/// Wraps a primary provider with static-set degradation.
///
/// Resolution never fails: a provider error or a response that fails grid
/// validation is logged and replaced from the fallback set, so a flaky
/// content service can never stall a round start.
pub struct Degrading<P: PromptProvider> {
    primary: P,
    fallback: StaticPromptSet,
    grid: BingoGrid,
}

impl<P: PromptProvider> Degrading<P> {
    pub fn new(primary: P, fallback: StaticPromptSet, grid: BingoGrid) -> Self {
        Self {
            primary,
            fallback,
            grid,
        }
    }

    /// Resolves the next round's prompt, degrading on any failure.
    pub async fn resolve(&self, request: &PromptRequest) -> RoundPrompt {
        match self.primary.next_prompt(request).await {
            Ok(prompt) => match prompt.validate(&self.grid) {
                Ok(()) => prompt,
                Err(e) => {
                    tracing::warn!(error = %e, "provider prompt failed validation, using static set");
                    self.fallback.next()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "prompt provider failed, using static set");
                self.fallback.next()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownProvider;

    impl PromptProvider for DownProvider {
        async fn next_prompt(
            &self,
            _request: &PromptRequest,
        ) -> Result<RoundPrompt, PromptError> {
            Err(PromptError::Unavailable("503".into()))
        }
    }

    struct OffGridProvider;

    impl PromptProvider for OffGridProvider {
        async fn next_prompt(
            &self,
            _request: &PromptRequest,
        ) -> Result<RoundPrompt, PromptError> {
            Ok(RoundPrompt {
                prompt: "off the board".into(),
                correct_target: TargetId(200),
                distractors: vec![TargetId(0)],
                category: None,
            })
        }
    }

    #[test]
    fn test_targets_are_sorted_and_include_correct() {
        let prompt = RoundPrompt {
            prompt: "q".into(),
            correct_target: TargetId(4),
            distractors: vec![TargetId(7), TargetId(1)],
            category: None,
        };
        assert_eq!(
            prompt.targets(),
            vec![TargetId(1), TargetId(4), TargetId(7)]
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_correct_in_distractors() {
        let grid = BingoGrid::default();
        let prompt = RoundPrompt {
            prompt: "q".into(),
            correct_target: TargetId(1),
            distractors: vec![TargetId(1), TargetId(2)],
            category: None,
        };
        assert!(matches!(
            prompt.validate(&grid),
            Err(PromptError::Malformed(_))
        ));
    }

    #[test]
    fn test_career_defaults_all_validate() {
        let grid = BingoGrid::default();
        let set = StaticPromptSet::career_defaults(&grid);
        for _ in 0..grid.cell_count() {
            set.next().validate(&grid).unwrap();
        }
    }

    #[test]
    fn test_static_set_cycles_round_robin() {
        let grid = BingoGrid::default();
        let set = StaticPromptSet::career_defaults(&grid);

        let first = set.next();
        for _ in 1..grid.cell_count() {
            set.next();
        }
        // Full cycle returns to the start.
        assert_eq!(set.next(), first);
    }

    #[tokio::test]
    async fn test_degrading_falls_back_when_provider_is_down() {
        let grid = BingoGrid::default();
        let degrading = Degrading::new(
            DownProvider,
            StaticPromptSet::career_defaults(&grid),
            grid,
        );

        let prompt = degrading.resolve(&PromptRequest::default()).await;
        prompt.validate(&grid).unwrap();
    }

    #[tokio::test]
    async fn test_degrading_falls_back_on_malformed_response() {
        let grid = BingoGrid::default();
        let degrading = Degrading::new(
            OffGridProvider,
            StaticPromptSet::career_defaults(&grid),
            grid,
        );

        let prompt = degrading.resolve(&PromptRequest::default()).await;
        assert!(grid.contains(prompt.correct_target));
    }
}
