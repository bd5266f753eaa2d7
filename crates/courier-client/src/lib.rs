//! # courier-client
//!
//! Headless application layer of Courier: the account, messaging, social
//! and settings commands a user interface calls, plus configuration and
//! event forwarding. The `courier-client` binary runs it as a daemon that
//! keeps an exchange directory in sync and logs every change.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::{ClientConfig, Settings};
pub use error::{AppError, Result, ValidationError};
pub use state::App;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("courier_client=debug,courier_store=info,courier_shared=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use courier_store::WatchMode;

    use super::*;
    use crate::commands::testing;

    #[test]
    fn test_end_to_end_scenario() {
        let t = testing::app();
        let app = &t.app;

        app.register("Alice", "alice", "pw", None).unwrap();
        app.register("Bob", "bob", "pw", None).unwrap();

        app.login("alice", "pw").unwrap();
        app.follow("bob").unwrap();
        app.logout();

        app.login("bob", "pw").unwrap();
        let hello = app.send_message("hello #test").unwrap();
        app.logout();

        app.login("alice", "pw").unwrap();
        let notifications = app.notifications().get_all_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].message_id(), hello.id);

        let tagged = app.messages().get_by_tag_containing("test");
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, hello.id);
        assert!(app.messages().get_mentioning("@bob").is_empty());
    }

    #[test]
    fn test_restart_reads_everything_back() {
        let t = testing::app();
        t.app.register("Alice", "alice", "pw", None).unwrap();
        t.app.register("Bob", "bob", "pw", None).unwrap();
        t.app.login("alice", "pw").unwrap();
        t.app.follow("bob").unwrap();
        t.app.login("bob", "pw").unwrap();
        t.app.send_message("one").unwrap();
        t.app.send_message("two").unwrap();
        t.app.login("alice", "pw").unwrap();
        t.app.notifications().mark_all_as_read().unwrap();
        t.app.shutdown();

        let restarted = App::new(testing::quiet_config(&t.exchange, &t.config_dir));
        let stats = restarted.start().unwrap().unwrap();
        assert_eq!(stats.users_imported, 2);
        assert_eq!(stats.messages_imported, 2);
        assert_eq!(stats.read_sets_found, 1);

        restarted.login("alice", "pw").unwrap();
        assert_eq!(restarted.notifications().get_unread_count(), 0);
    }

    #[test]
    fn test_two_instances_share_a_directory() {
        let exchange = tempfile::tempdir().unwrap();
        let config_a = tempfile::tempdir().unwrap();
        let config_b = tempfile::tempdir().unwrap();
        let live = |config_dir: &tempfile::TempDir| ClientConfig {
            debounce: Duration::from_millis(30),
            watch_mode: WatchMode::Poll,
            poll_interval: Duration::from_millis(50),
            ..testing::quiet_config(&exchange, config_dir)
        };

        let a = App::new(live(&config_a));
        let b = App::new(live(&config_b));
        a.start().unwrap();
        b.start().unwrap();

        let alice = a.register("Alice", "alice", "pw", None).unwrap();
        b.register("Bob", "bob", "pw", None).unwrap();

        let wait_for = |done: &dyn Fn() -> bool| {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !done() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
            done()
        };

        assert!(wait_for(&|| a.users().tag_exists("bob")), "bob never reached A");
        assert!(wait_for(&|| b.users().tag_exists("alice")), "alice never reached B");

        a.login("alice", "pw").unwrap();
        a.follow("bob").unwrap();
        b.login("bob", "pw").unwrap();
        let posted = b.send_message("ping from B").unwrap();

        assert!(
            wait_for(&|| a.notifications().get_unread_count() == 1),
            "notification never arrived on A"
        );
        assert_eq!(
            a.notifications().get_all_notifications()[0].message_id(),
            posted.id
        );
        assert!(wait_for(&|| b
            .users()
            .get(&alice.id)
            .is_some_and(|u| u.is_following("bob"))));

        a.shutdown();
        b.shutdown();
    }
}
