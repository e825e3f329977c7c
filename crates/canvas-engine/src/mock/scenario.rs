//! Deterministic run planning
//!
//! Everything a mock run will do is decided up front from the request and
//! its seed. Draw order from the generator is fixed: latency first, then the
//! branch-specific draws (retry hint, or tick count followed by the report
//! values). Replaying a plan never consumes randomness.

use std::time::Duration;

use canvas_model::{
    Confidence, ConfidenceLevel, ContentHash, DecisionReview, Driver, ErrorCode, ErrorDescriptor,
    Graph, ModelCard, NodeKind, Polarity, Report, ResultRanges, ReviewState, RunCompletion,
    RunDiagnostics, RunRequest, Seed, Strength, TemplateDetail,
};
use serde::Serialize;

use super::fixtures::RESULT_UNITS;
use super::MockConfig;
use crate::prng::Mulberry32;

/// Ticks emitted at minimum by a successful stream
pub const MIN_TICKS: u32 = 5;

/// Retry hint bounds for the rate-limited branch, seconds
pub const RETRY_AFTER_RANGE: (u32, u32) = (5, 15);

/// Maximum drivers in a mock report
const MAX_DRIVERS: usize = 3;

/// Outcome class selected by the seed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// `seed % 31 == 0`
    LimitExceeded,
    /// `seed % 29 == 0`
    RateLimited,
    /// `seed % 23 == 0`
    BadInput,
    /// Everything else
    Success,
}

impl Branch {
    /// Branch for `seed`; the first matching divisor wins
    #[must_use]
    pub fn for_seed(seed: Seed) -> Self {
        let s = seed.value();
        if s % 31 == 0 {
            Self::LimitExceeded
        } else if s % 29 == 0 {
            Self::RateLimited
        } else if s % 23 == 0 {
            Self::BadInput
        } else {
            Self::Success
        }
    }
}

/// Decision-review state for a successful run; depends only on the seed
#[must_use]
pub fn review_for(seed: Seed, template_name: &str) -> ReviewState {
    match seed.value() % 3 {
        0 => ReviewState::Ready {
            review: DecisionReview {
                summary: format!("{template_name}: the likely outcome clears the baseline"),
                recommendations: vec![
                    "Validate the strongest driver with a small experiment".to_string(),
                    "Re-run with a different seed before committing".to_string(),
                ],
            },
        },
        1 => ReviewState::Empty,
        _ => ReviewState::Error {
            error: ErrorDescriptor::new(
                ErrorCode::CeeTemporary,
                "decision review is temporarily unavailable",
            ),
        },
    }
}

/// A fully decided mock run
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Id announced in `Hello`
    pub response_id: String,
    /// Seed actually used
    pub seed: Seed,
    /// Selected branch
    pub branch: Branch,
    /// Delay between `Hello` and the first outcome event
    pub latency: Duration,
    /// Progress ticks on success
    pub ticks: u32,
    /// Terminal payload
    pub outcome: Result<RunCompletion, ErrorDescriptor>,
}

#[derive(Serialize)]
struct Identity<'a> {
    template_id: &'a str,
    seed: Seed,
    graph: &'a Graph,
}

/// Plan a run of `request` against `template`
///
/// # Errors
/// Returns an error only if the request cannot be hashed
pub fn plan(
    request: &RunRequest,
    template: &TemplateDetail,
    config: &MockConfig,
) -> Result<Scenario, ErrorDescriptor> {
    let seed = request.seed.unwrap_or(template.default_seed);
    let graph = request.graph.as_ref().unwrap_or(&template.graph);
    let hash = ContentHash::of_json(&Identity {
        template_id: &request.template_id,
        seed,
        graph,
    })
    .map_err(|err| ErrorDescriptor::bad_input(format!("request is not serializable: {err}")))?;
    let response_id = format!("mock_{}", hash.short());

    let mut rng = Mulberry32::new(seed);
    let drawn_ms = rng.next_in(
        config.latency_min_ms,
        config
            .latency_max_ms
            .saturating_sub(config.latency_min_ms)
            .saturating_add(1),
    );
    let latency = Duration::from_millis(config.fixed_delay_ms.unwrap_or(drawn_ms));

    let branch = Branch::for_seed(seed);
    let (ticks, outcome) = match branch {
        Branch::LimitExceeded => (
            0,
            Err(ErrorDescriptor::new(
                ErrorCode::LimitExceeded,
                "graph exceeds the engine's capacity limits",
            )
            .with_fields(["graph"])),
        ),
        Branch::RateLimited => {
            let (lo, hi) = RETRY_AFTER_RANGE;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let retry = (f64::from(lo) + rng.next_f64() * f64::from(hi - lo)).round() as u32;
            (
                0,
                Err(ErrorDescriptor::new(ErrorCode::RateLimited, "too many analysis requests")
                    .with_retry_after(retry.clamp(lo, hi))),
            )
        }
        Branch::BadInput => (
            0,
            Err(ErrorDescriptor::bad_input("the analysis engine rejected the graph")
                .with_fields(["graph.edges"])),
        ),
        Branch::Success => {
            #[allow(clippy::cast_possible_truncation)]
            let ticks = MIN_TICKS + rng.next_in(0, 3) as u32;
            let report = materialize(
                &request.template_id,
                seed,
                graph,
                template,
                hash,
                &response_id,
                &mut rng,
            );
            let completion = RunCompletion {
                report,
                diagnostics: Some(RunDiagnostics {
                    resumes: 1,
                    trims: 0,
                    recovered_events: 0,
                    correlation_id: Some(format!("mock-{}", hash.short())),
                }),
                degraded: false,
                review: review_for(seed, &template.summary.name),
            };
            (ticks, Ok(completion))
        }
    };

    Ok(Scenario {
        response_id,
        seed,
        branch,
        latency,
        ticks,
        outcome,
    })
}

fn strength_from(draw: f64) -> Strength {
    if draw < 0.33 {
        Strength::Low
    } else if draw < 0.66 {
        Strength::Medium
    } else {
        Strength::High
    }
}

fn rank(strength: Strength) -> u8 {
    match strength {
        Strength::High => 0,
        Strength::Medium => 1,
        Strength::Low => 2,
    }
}

fn materialize(
    template_id: &str,
    seed: Seed,
    graph: &Graph,
    template: &TemplateDetail,
    hash: ContentHash,
    response_id: &str,
    rng: &mut Mulberry32,
) -> Report {
    let likely = (10_000.0 + rng.next_f64() * 90_000.0).round();
    let spread = 0.1 + rng.next_f64() * 0.3;
    let (level, why) = if spread < 0.2 {
        (ConfidenceLevel::High, "narrow spread across scenarios")
    } else if spread < 0.3 {
        (ConfidenceLevel::Medium, "moderate spread across scenarios")
    } else {
        (ConfidenceLevel::Low, "wide spread; key factors are uncertain")
    };

    let mut drivers: Vec<Driver> = graph
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Factor | NodeKind::Risk | NodeKind::Option))
        .take(MAX_DRIVERS)
        .map(|node| {
            let strength = strength_from(rng.next_f64());
            let polarity = if node.kind == NodeKind::Risk || rng.next_f64() < 0.25 {
                Polarity::Down
            } else {
                Polarity::Up
            };
            Driver {
                label: node.data.label.clone(),
                node_id: Some(node.id.clone()),
                polarity,
                strength,
            }
        })
        .collect();
    drivers.sort_by_key(|d| rank(d.strength));

    Report {
        response_id: response_id.to_string(),
        template_id: template_id.to_string(),
        seed: seed.value(),
        model_card: ModelCard {
            response_hash: hash,
            template_version: template.summary.version.clone(),
        },
        results: ResultRanges {
            conservative: (likely * (1.0 - spread)).round(),
            likely,
            optimistic: (likely * (1.0 + spread)).round(),
            units: RESULT_UNITS.to_string(),
        },
        confidence: Confidence {
            level,
            why: why.to_string(),
        },
        drivers,
    }
}
