pub mod memory;
pub mod model;
pub mod pg;
pub mod store;

pub use memory::MemoryUserStore;
pub use model::{NewUser, PublicUser, User, UserPatch, UserRole, UserStatus};
pub use pg::PgUserStore;
pub use store::UserStore;
