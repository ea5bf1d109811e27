//! Modules bundled with the runtime

pub mod heartbeat;

pub use heartbeat::HeartbeatModule;

use crate::error::Result;
use crate::factory::ModuleFactory;

/// Register every bundled module class with `factory`
pub fn register_builtin_modules(factory: &mut ModuleFactory) -> Result<()> {
    factory.register::<HeartbeatModule>(HeartbeatModule::CLASS)
}
