//! Объекты реестра во время выполнения: модули, точки сервисов и
//! конфигураций, построение, shutdown и события потоков

mod configuration_point;
mod construction;
mod module;
mod service_point;
mod shutdown;
mod thread_events;

pub use configuration_point::{ConfigurationItem, ConfigurationItems, ConfigurationPointImpl};
pub(crate) use configuration_point::ConfigurationPointParts;
pub use construction::{ConstructionGate, ConstructionState, ReentrancyGuard, ReentrancyTracker};
pub use module::{ModuleImpl, RegistryServices};
pub(crate) use module::expand_symbols;
pub use service_point::{BuiltService, ServicePointImpl};
pub(crate) use service_point::{ResolvedInterceptor, ServicePointParts};
pub use shutdown::{RegistryShutdownListener, ServiceObjectShutdownListener, ShutdownCoordinator};
pub use thread_events::{ThreadCleanupListener, ThreadEventNotifier};
