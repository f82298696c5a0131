//! Ctrl-C bridge

use std::sync::Arc;

use log::{info, warn};

use evl_core::{EventFlags, EventMask};

use crate::PortError;

/// Post `bits` into `flags` whenever the process receives SIGINT.
///
/// The handler runs on a dedicated thread, so it only posts; an event
/// callback registered for `bits` decides what to do on the scheduler thread.
/// Only one handler can be installed per process.
pub fn post_on_interrupt<F>(flags: Arc<F>, bits: EventMask) -> Result<(), PortError>
where
    F: EventFlags + Send + Sync + 'static,
{
    ctrlc::set_handler(move || {
        info!("interrupt received, posting {}", bits);
        if let Err(err) = flags.post(bits) {
            warn!("failed to post interrupt bits: {}", err);
        }
    })?;
    Ok(())
}
