//! Services - simulation engine and its control plane
//!
//! - `simulation_state` - Lock-guarded sensor state shared by all writers
//! - `simulator` - Notification decision and customer count updates
//! - `delay` - Randomized, cancellable inter-tick delay
//! - `publish_loop` - Wait/decide/publish cycle with bounded retry
//! - `control` - Desired-property updates and the SetCustomerCount method

pub mod control;
pub mod delay;
pub mod publish_loop;
pub mod simulation_state;
pub mod simulator;

// Re-export commonly used types
pub use control::{ConfigFieldError, ControlSurface, DesiredUpdate, MethodResponse};
pub use delay::DelayScheduler;
pub use publish_loop::{LoopExit, LoopState, PublishError, PublishLoop, Publisher};
pub use simulation_state::{SimulationState, StateFields};
pub use simulator::FlowSimulator;
