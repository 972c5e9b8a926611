use super::command::Setting;
use super::context::{RunContext, Services};
use crate::host::{SETTING_RENAME, SETTING_RETAIN};

/// Change or report a boolean setting
///
/// A change applies to the rest of this run and is persisted for later ones.
pub(super) fn apply(ctx: &mut RunContext, services: &Services, setting: Setting, value: Option<bool>) {
    let (key, slot) = match setting {
        Setting::Retain => (SETTING_RETAIN, &mut ctx.policy.retain),
        Setting::Rename => (SETTING_RENAME, &mut ctx.policy.renumber),
    };
    match value {
        Some(value) => {
            *slot = value;
            services.settings.set_bool(key, value);
            ctx.log.info(format!("{} set to {value}", setting.name()));
        }
        None => {
            let current = *slot;
            ctx.log.info(format!("{} is {current}", setting.name()));
        }
    }
}
