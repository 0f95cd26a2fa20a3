use crate::{
    CounterStrategy, GenerationRequest, Result, RowId, ScanStrategy, SequenceStrategy,
    SequencerConfig, StrategyKind, Transaction,
};

/// The strategy selected for a deployment.
///
/// Chosen once from [`SequencerConfig::strategy`]; every generation then
/// dispatches through a single match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Scan(ScanStrategy),
    Counter(CounterStrategy),
}

impl Strategy {
    #[must_use]
    pub const fn from_config(config: &SequencerConfig) -> Self {
        match config.strategy {
            StrategyKind::Scan => Self::Scan(ScanStrategy::new(config.max_collision_retries)),
            StrategyKind::Counter => {
                Self::Counter(CounterStrategy::new(config.max_collision_retries))
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::Scan(_) => StrategyKind::Scan,
            Self::Counter(_) => StrategyKind::Counter,
        }
    }
}

impl SequenceStrategy for Strategy {
    fn next_value<T: Transaction>(
        &self,
        tx: &mut T,
        table: &'static str,
        request: &GenerationRequest,
        exclude: Option<RowId>,
    ) -> Result<i64> {
        match self {
            Self::Scan(s) => s.next_value(tx, table, request, exclude),
            Self::Counter(s) => s.next_value(tx, table, request, exclude),
        }
    }

    fn observe_preset<T: Transaction>(
        &self,
        tx: &mut T,
        table: &'static str,
        request: &GenerationRequest,
        value: i64,
    ) -> Result<()> {
        match self {
            Self::Scan(s) => s.observe_preset(tx, table, request, value),
            Self::Counter(s) => s.observe_preset(tx, table, request, value),
        }
    }
}
