//! Window message relay
//!
//! Messages are offered to the framework's consumers in a fixed order
//! (loader, raw input, UI, input binds). The first consumer to claim a
//! message ends its journey; unclaimed messages continue to the host's
//! original window procedure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use framehook_sdk::{Disposition, WindowMessage, WM_DESTROY};

use crate::services::ServiceCell;

/// Value returned to Windows for a claimed message
pub const HANDLED_RESULT: isize = 0;

pub struct MessageRelay {
    services: Arc<ServiceCell>,
    shutdown_signalled: AtomicBool,
}

impl MessageRelay {
    pub fn new(services: Arc<ServiceCell>) -> Self {
        Self {
            services,
            shutdown_signalled: AtomicBool::new(false),
        }
    }

    /// Dispatch one message, forwarding it to the host if nobody claims it
    pub fn on_message(
        &self,
        message: WindowMessage,
        forward: impl FnOnce(WindowMessage) -> isize,
    ) -> isize {
        let Some(framework) = self.services.get() else {
            return forward(message);
        };

        for (name, consumer) in framework.input.ordered() {
            if consumer.consume(&message) == Disposition::Handled {
                tracing::trace!("Message {:#x} handled by {}", message.msg, name);
                return HANDLED_RESULT;
            }
        }

        if message.msg == WM_DESTROY && !self.shutdown_signalled.swap(true, Ordering::AcqRel) {
            tracing::info!("Host window destroyed, shutting down framework");
            framework.shutdown.shutdown(WM_DESTROY);
        }

        let message = message.remap_passthrough();

        if let Some(pointer_fix) = &framework.pointer_fix {
            pointer_fix.observe(&message);
        }

        forward(message)
    }

    pub fn shutdown_signalled(&self) -> bool {
        self.shutdown_signalled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{failing_cell, recording_framework, resolved_cell, Recorder};
    use framehook_engine::MessageObserver;
    use framehook_sdk::{WindowHandle, WM_PASSTHROUGH_FIRST, WM_USER};
    use parking_lot::Mutex;

    const WM_KEYDOWN: u32 = 0x0100;

    fn message(code: u32) -> WindowMessage {
        WindowMessage::new(WindowHandle(0x77), code, 1, 2)
    }

    fn relay() -> (MessageRelay, Arc<Recorder>) {
        let (framework, recorder) = recording_framework();
        (MessageRelay::new(resolved_cell(framework)), recorder)
    }

    #[test]
    fn test_unclaimed_message_visits_all_consumers_then_host() {
        let (relay, recorder) = relay();
        let mut forwarded = None;

        let result = relay.on_message(message(WM_KEYDOWN), |m| {
            forwarded = Some(m);
            42
        });

        assert_eq!(result, 42);
        assert_eq!(forwarded, Some(message(WM_KEYDOWN)));
        assert_eq!(
            recorder.log.take(),
            ["loader:0x100", "raw_input:0x100", "ui:0x100", "input_binds:0x100"]
        );
    }

    #[test]
    fn test_claimed_message_stops_chain() {
        let (relay, recorder) = relay();
        *recorder.log.claim.lock() = Some("raw_input");

        let result = relay.on_message(message(WM_KEYDOWN), |_| panic!("reached host"));

        assert_eq!(result, HANDLED_RESULT);
        assert_eq!(recorder.log.take(), ["loader:0x100", "raw_input:0x100"]);
    }

    #[test]
    fn test_destroy_signals_shutdown_once() {
        let (relay, recorder) = relay();

        relay.on_message(message(WM_DESTROY), |_| 0);
        relay.on_message(message(WM_DESTROY), |_| 0);

        assert_eq!(recorder.log.count("shutdown:2"), 1);
        assert!(relay.shutdown_signalled());
    }

    #[test]
    fn test_claimed_destroy_does_not_shut_down() {
        let (relay, recorder) = relay();
        *recorder.log.claim.lock() = Some("loader");

        relay.on_message(message(WM_DESTROY), |_| 0);
        assert_eq!(recorder.log.count("shutdown:2"), 0);
    }

    #[test]
    fn test_passthrough_code_is_remapped() {
        let (relay, _) = relay();
        let mut code = None;

        relay.on_message(message(WM_PASSTHROUGH_FIRST + 5), |m| {
            code = Some(m.msg);
            0
        });
        assert_eq!(code, Some(5));

        relay.on_message(message(WM_USER + 1), |m| {
            code = Some(m.msg);
            0
        });
        assert_eq!(code, Some(WM_USER + 1));
    }

    #[test]
    fn test_pointer_fix_sees_remapped_message() {
        struct Seen(Mutex<Vec<u32>>);
        impl MessageObserver for Seen {
            fn observe(&self, message: &WindowMessage) {
                self.0.lock().push(message.msg);
            }
        }

        let (framework, _) = recording_framework();
        let seen = Arc::new(Seen(Mutex::new(Vec::new())));
        let framework = Arc::new(
            Arc::try_unwrap(framework)
                .ok()
                .unwrap()
                .with_pointer_fix(seen.clone()),
        );
        let relay = MessageRelay::new(resolved_cell(framework));

        relay.on_message(message(WM_PASSTHROUGH_FIRST + 0x200), |_| 0);
        assert_eq!(*seen.0.lock(), [0x200]);
    }

    #[test]
    fn test_forwards_without_framework() {
        let relay = MessageRelay::new(failing_cell());
        let result = relay.on_message(message(WM_PASSTHROUGH_FIRST + 5), |m| m.msg as isize);
        assert_eq!(result, (WM_PASSTHROUGH_FIRST + 5) as isize);
    }
}
