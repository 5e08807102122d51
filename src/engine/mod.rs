pub mod announcer;
pub mod arbiter;
pub mod caller;
pub mod card;
pub mod draw;
pub mod pattern;
pub mod types;

pub use caller::CallerRegistry;
pub use pattern::PatternSet;
pub use types::{GameId, TenantId};
