use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::email::SystemMailer;
use crate::rate_limit::LoginRateLimiter;
use crate::reminders::ReminderScheduler;
use crate::tenancy::{PgConnector, TenantRouter};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    /// Main registry database.
    pub pool: PgPool,
    pub config: Config,
    pub tenants: TenantRouter<PgConnector>,
    pub mailer: SystemMailer,
    pub login_limiter: LoginRateLimiter,
    /// Wrong verification codes, keyed `otp:<COMPANY>:<email>`.
    pub otp_limiter: LoginRateLimiter,
    pub reminders: Arc<ReminderScheduler>,
}
