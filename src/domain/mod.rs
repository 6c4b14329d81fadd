pub mod agent;
pub mod market;
pub mod reasoning;
pub mod session;

pub use agent::*;
pub use market::*;
pub use reasoning::*;
pub use session::*;
