pub mod companies;
pub mod reminders;
pub mod tenant_users;
pub mod users;
