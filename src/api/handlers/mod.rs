//! HTTP request handlers organized by resource type

pub mod aggregate;
pub mod dynamic;
pub mod health;
pub mod secrets;

pub use aggregate::{all_secrets_handler, debug_vault_handler};
pub use dynamic::{
    list_available_handler, list_dynamic_secrets_handler, revoke_dynamic_secret_handler,
};
pub use health::{health_handler, root_handler};
pub use secrets::{
    create_secret_key_handler, create_secret_type_handler, delete_secret_key_handler,
    delete_secret_type_handler, get_secret_handler, get_static_secret_handler,
    list_static_secrets_handler, update_secret_key_handler,
};
