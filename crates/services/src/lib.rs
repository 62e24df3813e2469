pub mod actor;
pub mod analysis;
pub mod auth;
pub mod error;
pub mod flows;
pub mod price;
pub mod scope;

pub use crate::actor::{CanisterResult, InMemorySavingsActor, SavingsActor};
pub use crate::analysis::AnalysisStore;
pub use crate::auth::{ActorHandle, AuthConfig, AuthService, IdentityProvider, StaticIdentityProvider};
pub use crate::error::{CanisterError, Result, ServiceError};
pub use crate::flows::{FlowReport, FlowStep, PlanView, StepStatus};
pub use crate::price::PriceService;
pub use crate::scope::TaskScope;
