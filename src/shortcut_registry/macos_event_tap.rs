use std::{
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use core_foundation::{
    base::Boolean,
    runloop::{kCFRunLoopCommonModes, CFRunLoop},
};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::key::{Key, KeyEvent, KeyPhase, Modifiers};

#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    fn AXIsProcessTrusted() -> Boolean;
}

/// Listen-only session event tap that forwards every key press and release
/// to a channel. Matching happens on the receiving side.
#[derive(Default)]
pub struct MacOSKeyEventTap {
    thread_handle: Mutex<Option<TapThreadHandle>>,
}

struct TapThreadHandle {
    run_loop: CFRunLoop,
    join_handle: JoinHandle<()>,
}

impl MacOSKeyEventTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_accessibility_permission() -> bool {
        // SAFETY: AXIsProcessTrusted takes no parameters and returns process trust status.
        unsafe { AXIsProcessTrusted() != 0 }
    }

    pub fn start(&self, sender: UnboundedSender<KeyEvent>) -> Result<(), String> {
        if !Self::has_accessibility_permission() {
            return Err(
                "Accessibility permission is required to observe global key events".to_string(),
            );
        }

        {
            let thread_handle = self.thread_handle.lock().map_err(|_| lock_error())?;
            if thread_handle.is_some() {
                return Ok(());
            }
        }

        let (startup_tx, startup_rx) = mpsc::channel::<Result<CFRunLoop, String>>();
        let sender = Arc::new(sender);
        let join_handle = thread::Builder::new()
            .name("pathbar-key-event-tap".to_string())
            .spawn(move || run_event_tap_thread(sender, startup_tx))
            .map_err(|error| format!("Failed to spawn event tap thread: {error}"))?;

        match startup_rx.recv() {
            Ok(Ok(run_loop)) => {
                let mut thread_handle = self.thread_handle.lock().map_err(|_| lock_error())?;
                if thread_handle.is_some() {
                    run_loop.stop();
                    let _ = join_handle.join();
                    return Ok(());
                }

                *thread_handle = Some(TapThreadHandle {
                    run_loop,
                    join_handle,
                });

                debug!("macOS key event tap started");
                Ok(())
            }
            Ok(Err(error)) => {
                let _ = join_handle.join();
                Err(error)
            }
            Err(error) => {
                let _ = join_handle.join();
                Err(format!(
                    "Event tap startup channel closed unexpectedly: {error}"
                ))
            }
        }
    }

    pub fn stop(&self) -> Result<(), String> {
        let thread_handle = {
            let mut handle = self.thread_handle.lock().map_err(|_| lock_error())?;
            handle.take()
        };

        if let Some(TapThreadHandle {
            run_loop,
            join_handle,
        }) = thread_handle
        {
            run_loop.stop();
            join_handle
                .join()
                .map_err(|_| "Event tap thread panicked while stopping".to_string())?;
            debug!("macOS key event tap stopped");
        }

        Ok(())
    }
}

impl Drop for MacOSKeyEventTap {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(%error, "failed to stop key event tap");
        }
    }
}

fn key_event_from_raw(phase: KeyPhase, key_code: u16, raw_flags: u64, autorepeat: bool) -> KeyEvent {
    KeyEvent {
        key: Key::from_code(key_code),
        modifiers: Modifiers::from_bits_truncate(raw_flags),
        phase,
        is_repeat: autorepeat,
    }
}

fn key_event_from_cg(event_type: CGEventType, event: &CGEvent) -> Option<KeyEvent> {
    let phase = match event_type {
        CGEventType::KeyDown => KeyPhase::Down,
        CGEventType::KeyUp => KeyPhase::Up,
        _ => return None,
    };
    let key_code =
        u16::try_from(event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE)).ok()?;
    let autorepeat = phase == KeyPhase::Down
        && event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;

    Some(key_event_from_raw(
        phase,
        key_code,
        event.get_flags().bits(),
        autorepeat,
    ))
}

fn run_event_tap_thread(
    sender: Arc<UnboundedSender<KeyEvent>>,
    startup_tx: mpsc::Sender<Result<CFRunLoop, String>>,
) {
    let run_loop = CFRunLoop::get_current();

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown, CGEventType::KeyUp],
        move |_proxy, event_type, event| {
            match event_type {
                CGEventType::KeyDown | CGEventType::KeyUp => {
                    if let Some(key_event) = key_event_from_cg(event_type, event) {
                        if sender.send(key_event).is_err() {
                            debug!("key event receiver dropped; ignoring event");
                        }
                    }
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    warn!(
                        ?event_type,
                        "macOS event tap was disabled by the system; shortcuts stop firing until restarted"
                    );
                }
                _ => {}
            }
            None
        },
    ) {
        Ok(tap) => tap,
        Err(_) => {
            let _ = startup_tx.send(Err("Failed to create CGEventTap".to_string()));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = startup_tx.send(Err("Failed to create event tap runloop source".to_string()));
            return;
        }
    };

    // SAFETY: `kCFRunLoopCommonModes` is a valid CoreFoundation runloop mode.
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();

    if startup_tx.send(Ok(run_loop.clone())).is_err() {
        return;
    }

    CFRunLoop::run_current();

    // SAFETY: `kCFRunLoopCommonModes` is the same mode used for add_source above.
    unsafe {
        run_loop.remove_source(&source, kCFRunLoopCommonModes);
    }
}

fn lock_error() -> String {
    "macOS key event tap state lock was poisoned".to_string()
}
