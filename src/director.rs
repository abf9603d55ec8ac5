//! The plugin's director: hooks into the framework lifecycle, subscribes to the city init
//! messages and applies the patch when they arrive.

#[cfg(all(windows, target_arch = "x86"))]
pub mod exported;

use strum::IntoEnumIterator;

use crate::host::{FrameworkState, Host, MessageServer, Notification};
use crate::patch::{PropertyPatch, Verification, KICK_OUT_LOWER_WEALTH};
use crate::settings::Settings;

pub const DIRECTOR_ID: u32 = 0x3BF47A2F;

pub struct Director {
    patch: PropertyPatch,
    verify_after_city_init: bool,
}

impl Director {
    pub fn new(settings: &Settings) -> Director {
        Director {
            patch: KICK_OUT_LOWER_WEALTH,
            verify_after_city_init: settings.verify_after_city_init,
        }
    }

    pub fn id(&self) -> u32 {
        DIRECTOR_ID
    }

    /// Called once the game has loaded the plugin. If the framework hasn't reached app init yet
    /// we wait for the `PostAppInit` hook, otherwise we're late and subscribe straight away.
    pub fn on_start<H: Host>(&self, host: &H) -> bool {
        if host.framework_state() < FrameworkState::PreAppInit as u32 {
            if !host.add_hook() {
                log::error!("Failed to register for framework callbacks.");
            }
        } else {
            log::debug!("Framework already initialised, subscribing immediately.");
            self.post_app_init(host);
        }

        true
    }

    /// Subscribes to the city init notifications.
    pub fn post_app_init<H: Host>(&self, host: &H) -> bool {
        let server = match host.message_server() {
            Some(server) => server,
            None => {
                log::error!("Failed to subscribe to the required notifications.");
                return false;
            }
        };

        for notification in Notification::iter() {
            if !server.add_notification(notification.id()) {
                log::error!("Failed to subscribe to the required notifications.");
                return false;
            }
        }

        true
    }

    pub fn do_message<H: Host>(&self, host: &H, message_type: u32) -> bool {
        match Notification::from_repr(message_type) {
            Some(Notification::PreCityInit) => self.pre_city_init(host),
            Some(Notification::PostCityInit) => self.post_city_init(host),
            None => log::trace!("Ignoring message {:#010x}.", message_type),
        }

        true
    }

    fn pre_city_init<H: Host>(&self, host: &H) {
        match self.patch.apply(host) {
            Ok(()) => log::info!(
                "Set the '{}' property to {}.",
                self.patch.name,
                self.patch.value
            ),
            Err(err) => log::error!("{}", err),
        }
    }

    fn post_city_init<H: Host>(&self, host: &H) {
        if !self.verify_after_city_init {
            return;
        }

        match self.patch.verify(host) {
            Ok(Verification::Intact) => {
                log::debug!("The '{}' property is still {}.", self.patch.name, self.patch.value)
            }
            Ok(Verification::Reset) => log::warn!(
                "Someone else changed the '{}' property's value, cache refresh?",
                self.patch.name
            ),

            // Already reported at error level when the patch was applied.
            Err(err) => log::debug!("Could not verify the patch: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{FakeExemplar, FakeHost, FakeMessages, FakeVariant};
    use crate::logging::capture;
    use log::Level;

    fn director() -> Director {
        Director::new(&Settings::default())
    }

    fn kick_out_host(value: bool) -> (FakeHost, FakeExemplar) {
        let exemplar = FakeExemplar::with(
            KICK_OUT_LOWER_WEALTH.property_id,
            Some(FakeVariant::bool(value)),
        );
        let host = FakeHost::new().with_exemplar(KICK_OUT_LOWER_WEALTH.key, exemplar.clone());
        (host, exemplar)
    }

    #[test]
    fn reports_its_director_id() {
        assert_eq!(director().id(), 0x3BF47A2F);
    }

    #[test]
    fn early_start_waits_for_the_framework_hook() {
        let host = FakeHost::new();

        assert!(director().on_start(&host));
        assert!(host.hooked.get());
        assert!(host.messages.as_ref().unwrap().subscribed.borrow().is_empty());
    }

    #[test]
    fn late_start_subscribes_immediately() {
        let mut host = FakeHost::new();
        host.state = FrameworkState::Running as u32;

        assert!(director().on_start(&host));
        assert!(!host.hooked.get());
        assert_eq!(
            *host.messages.as_ref().unwrap().subscribed.borrow(),
            vec![0x26D31EC0, 0x26D31EC1]
        );
    }

    #[test]
    fn post_app_init_subscribes_to_both_notifications() {
        let host = FakeHost::new();

        assert!(director().post_app_init(&host));
        assert_eq!(
            *host.messages.as_ref().unwrap().subscribed.borrow(),
            vec![0x26D31EC0, 0x26D31EC1]
        );
    }

    #[test]
    fn post_app_init_fails_without_a_message_server() {
        let mut host = FakeHost::new();
        host.messages = None;

        assert!(!director().post_app_init(&host));
    }

    #[test]
    fn post_app_init_stops_at_the_first_failed_subscription() {
        let mut host = FakeHost::new();
        host.messages = Some(FakeMessages {
            fail_at: Some(1),
            ..FakeMessages::default()
        });

        assert!(!director().post_app_init(&host));
        assert_eq!(
            *host.messages.as_ref().unwrap().subscribed.borrow(),
            vec![0x26D31EC0]
        );
    }

    #[test]
    fn pre_city_init_message_applies_the_patch() {
        let (host, exemplar) = kick_out_host(true);

        assert!(director().do_message(&host, Notification::PreCityInit.id()));
        assert_eq!(
            exemplar.get(KICK_OUT_LOWER_WEALTH.property_id),
            Some(Some(FakeVariant::bool(false)))
        );
    }

    #[test]
    fn post_city_init_message_only_reads() {
        let (host, exemplar) = kick_out_host(true);

        assert!(director().do_message(&host, Notification::PostCityInit.id()));
        assert_eq!(
            exemplar.get(KICK_OUT_LOWER_WEALTH.property_id),
            Some(Some(FakeVariant::bool(true)))
        );
    }

    #[test]
    fn other_messages_are_accepted_and_ignored() {
        let (host, exemplar) = kick_out_host(true);

        assert!(director().do_message(&host, 0xDEADBEEF));
        assert_eq!(
            exemplar.get(KICK_OUT_LOWER_WEALTH.property_id),
            Some(Some(FakeVariant::bool(true)))
        );
    }

    #[test]
    fn messages_are_handled_even_when_the_game_is_missing_services() {
        let mut host = FakeHost::new();
        host.resources = None;

        let director = director();
        assert!(director.do_message(&host, Notification::PreCityInit.id()));
        assert!(director.do_message(&host, Notification::PostCityInit.id()));
    }

    const NAME: &str = "Tract Developer Kick Out Lower Wealth";

    #[test]
    fn successful_patch_is_logged_at_info() {
        let (host, _) = kick_out_host(true);

        capture::start();
        director().do_message(&host, Notification::PreCityInit.id());

        assert_eq!(
            capture::take(),
            vec![(
                Level::Info,
                format!("Set the '{}' property to false.", NAME)
            )]
        );
    }

    #[test]
    fn failed_patch_is_logged_at_error() {
        let mut host = FakeHost::new();
        host.resources = None;

        capture::start();
        director().do_message(&host, Notification::PreCityInit.id());

        assert_eq!(
            capture::take(),
            vec![(
                Level::Error,
                "The resource manager pointer was null.".to_string()
            )]
        );
    }

    #[test]
    fn reset_value_is_logged_at_warn() {
        let (host, _) = kick_out_host(true);

        capture::start();
        director().do_message(&host, Notification::PostCityInit.id());

        assert_eq!(
            capture::take(),
            vec![(
                Level::Warn,
                format!(
                    "Someone else changed the '{}' property's value, cache refresh?",
                    NAME
                )
            )]
        );
    }

    #[test]
    fn intact_value_produces_no_warning() {
        let (host, _) = kick_out_host(false);

        capture::start();
        director().do_message(&host, Notification::PostCityInit.id());

        let records = capture::take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Level::Debug);
    }

    #[test]
    fn verification_lookup_failures_are_logged_at_debug() {
        let host =
            FakeHost::new().with_exemplar(KICK_OUT_LOWER_WEALTH.key, FakeExemplar::default());

        capture::start();
        director().do_message(&host, Notification::PostCityInit.id());

        assert_eq!(
            capture::take(),
            vec![(
                Level::Debug,
                format!("Could not verify the patch: The '{}' property does not exist.", NAME)
            )]
        );
    }

    #[test]
    fn failed_subscription_is_logged_at_error() {
        let mut host = FakeHost::new();
        host.messages = None;

        capture::start();
        director().post_app_init(&host);

        assert_eq!(
            capture::take(),
            vec![(
                Level::Error,
                "Failed to subscribe to the required notifications.".to_string()
            )]
        );
    }

    #[test]
    fn verification_runs_by_default() {
        let (host, _) = kick_out_host(false);

        director().do_message(&host, Notification::PostCityInit.id());

        assert_eq!(host.resource_lookups.get(), 1);
    }

    #[test]
    fn verification_can_be_turned_off() {
        let settings = Settings {
            verify_after_city_init: false,
            ..Settings::default()
        };
        let (host, _) = kick_out_host(true);

        capture::start();
        assert!(Director::new(&settings).do_message(&host, Notification::PostCityInit.id()));

        assert!(capture::take().is_empty());
        assert_eq!(host.resource_lookups.get(), 0);
    }
}
