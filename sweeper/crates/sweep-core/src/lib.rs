//! Parameter sweeps against a strategy tester that can only be driven
//! through its rendered UI.
//!
//! The tester is opaque: there is no API, no completion signal and no error
//! channel. The [`Optimizer`] drives it through two narrow capabilities,
//! [`InputDriver`] (apply one input and trigger a recompute) and
//! [`ResultReader`] (snapshot the rendered metrics), and keeps the best
//! candidate that clears the [`AcceptanceCriteria`].

pub mod collab;
pub mod control;
pub mod criteria;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod params;
pub mod poll;
pub mod spec;

pub use collab::{InputDriver, ResultReader};
pub use control::{CancelToken, RunControl, RunGuard, RunLock, SweepEvent};
pub use criteria::AcceptanceCriteria;
pub use error::{ApplyBestError, ConfigError, OptimizeError, StepError};
pub use metrics::{MetricKey, MetricsSnapshot};
pub use optimizer::{
    ApplyStatus, BestInputs, BestResult, BestSelection, Optimizer, ParamValue, SweepOutcome,
    SweepReport, SweepSettings, Trial, TrialStatus,
};
pub use params::{Parameter, ParameterSet};
pub use poll::{PollPolicy, poll_until};
pub use spec::{SpecError, SweepSpec, load_sweep_spec};
