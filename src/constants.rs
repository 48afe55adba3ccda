pub mod totp {

    pub const STEP_SECONDS: u64 = 30;

    pub const DIGITS: usize = 6;

    /// Raw secret length in bytes; encodes to 32 base32 characters.
    pub const SECRET_BYTES: usize = 20;
}

pub mod session {

    pub const PENDING_LOGIN_KEY: &str = "pending_login";

    pub const ACCOUNT_ID_KEY: &str = "account_id";
}

pub mod routes {

    pub const LOGIN: &str = "/auth/login";

    pub const OTP_SETUP: &str = "/auth/2fa-setup";

    pub const OTP_VERIFY: &str = "/auth/2fa-verify";

    pub const RESET_PASSWORD: &str = "/auth/reset_password";

    pub const INDEX: &str = "/";
}

pub mod limits {

    pub const INCIDENTS_PER_PAGE: u64 = 10;

    pub const DASHBOARD_DAYS: i64 = 30;

    pub const DASHBOARD_TOP_CATEGORIES: usize = 5;

    pub const USERNAME_MIN: usize = 3;

    pub const USERNAME_MAX: usize = 64;

    pub const EMAIL_MAX: usize = 120;

    pub const CATEGORY_NAME_MAX: usize = 64;

    pub const CATEGORY_DESCRIPTION_MAX: usize = 255;

    pub const INCIDENT_TITLE_MAX: usize = 140;

    pub const INCIDENT_DESCRIPTION_MIN: usize = 10;
}
