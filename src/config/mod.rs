//! Static configuration: app registry, prompts and UI strings.

pub mod apps;
mod i18n;
mod prompts;

pub use apps::{
    app_for_package, list_supported_apps, package_for, APP_PACKAGES, HARMONY_APP_BUNDLES,
    IOS_APP_BUNDLES,
};
pub use i18n::{get_messages, Lang, Messages};
pub use prompts::{get_system_prompt, system_prompt_for_date, SYSTEM_PROMPT_CN, SYSTEM_PROMPT_EN};
