use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pass {
    RootSelection,
    ForwardPropagation,
    CoParentAlignment,
    SiblingCohesion,
    SpouseRealignment,
    Validation,
    FinalSiblingCohesion,
    Normalization,
    Orphans,
    Clustering,
    Positioning,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RootSelection => "root-selection",
            Self::ForwardPropagation => "forward-propagation",
            Self::CoParentAlignment => "co-parent-alignment",
            Self::SiblingCohesion => "sibling-cohesion",
            Self::SpouseRealignment => "spouse-realignment",
            Self::Validation => "validation",
            Self::FinalSiblingCohesion => "final-sibling-cohesion",
            Self::Normalization => "normalization",
            Self::Orphans => "orphans",
            Self::Clustering => "clustering",
            Self::Positioning => "positioning",
        };
        f.write_str(name)
    }
}

pub trait LayoutObserver {
    /// A pass finished; `changed` counts generation writes it made.
    fn pass_finished(&mut self, _pass: Pass, _changed: usize) {}

    fn member_moved(&mut self, _id: &str, _from: i32, _to: i32, _pass: Pass) {}

    /// A capped loop stopped before reaching a fixpoint.
    fn not_converged(&mut self, _pass: Pass, _iterations: usize) {}

    fn note(&mut self, _pass: Pass, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LayoutObserver for NoopObserver {}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LayoutObserver for TracingObserver {
    fn pass_finished(&mut self, pass: Pass, changed: usize) {
        tracing::debug!(%pass, changed, "layout pass finished");
    }

    fn member_moved(&mut self, id: &str, from: i32, to: i32, pass: Pass) {
        tracing::trace!(member = id, from, to, %pass, "generation changed");
    }

    fn not_converged(&mut self, pass: Pass, iterations: usize) {
        tracing::warn!(%pass, iterations, "iteration cap reached; keeping best-effort generations");
    }

    fn note(&mut self, pass: Pass, message: &str) {
        tracing::debug!(%pass, "{message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceEvent {
    PassFinished { pass: Pass, changed: usize },
    MemberMoved { id: String, from: i32, to: i32, pass: Pass },
    NotConverged { pass: Pass, iterations: usize },
    Note { pass: Pass, message: String },
}

/// Keeps every event in memory; used by tests and the CLI `--trace` dump.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub events: Vec<TraceEvent>,
}

impl RecordingObserver {
    pub fn moves(&self, pass: Pass) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, TraceEvent::MemberMoved { pass: p, .. } if *p == pass))
            .count()
    }

    pub fn converged(&self) -> bool {
        !self
            .events
            .iter()
            .any(|event| matches!(event, TraceEvent::NotConverged { .. }))
    }
}

impl LayoutObserver for RecordingObserver {
    fn pass_finished(&mut self, pass: Pass, changed: usize) {
        self.events.push(TraceEvent::PassFinished { pass, changed });
    }

    fn member_moved(&mut self, id: &str, from: i32, to: i32, pass: Pass) {
        self.events.push(TraceEvent::MemberMoved {
            id: id.to_string(),
            from,
            to,
            pass,
        });
    }

    fn not_converged(&mut self, pass: Pass, iterations: usize) {
        self.events.push(TraceEvent::NotConverged { pass, iterations });
    }

    fn note(&mut self, pass: Pass, message: &str) {
        self.events.push(TraceEvent::Note {
            pass,
            message: message.to_string(),
        });
    }
}
