pub mod company;
pub mod reminder;
pub mod tenant_user;
pub mod user;

pub use company::Company;
pub use reminder::ReminderKind;
pub use tenant_user::{NewTenantUser, TenantUser};
pub use user::User;
