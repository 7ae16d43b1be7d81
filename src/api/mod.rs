// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod admin_handlers {
    pub use crate::admin_handlers::*;
}

pub mod auth {
    pub use crate::auth::*;
}

pub mod webhook_handler {
    pub use crate::webhook_handler::*;
}
