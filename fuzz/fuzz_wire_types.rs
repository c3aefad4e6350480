//! Fuzz target for the control-socket request decoders.
//!
//! Run with: cargo +nightly fuzz run fuzz_wire_types
//!
//! Decodes arbitrary bytes as every request body the daemon accepts. A decoded
//! ping must echo byte-for-byte, and a decoded `SetOrToggle` must encode back
//! to the integer it came from.

#![no_main]

use kestrel_core::ipc::{Geometry, PingRequest, QuitRequest, SetOrToggle, ShutdownWatchRequest};
use kestrel_core::service::echo;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<QuitRequest>(data);
    let _ = serde_json::from_slice::<ShutdownWatchRequest>(data);

    if let Ok(request) = serde_json::from_slice::<PingRequest>(data) {
        let payload = request.payload.clone();
        assert_eq!(echo(request).payload, payload);
    }

    if let Ok(geometry) = serde_json::from_slice::<Geometry>(data) {
        let _ = serde_json::to_vec(&geometry);
    }

    if let Ok(value) = serde_json::from_slice::<SetOrToggle>(data) {
        let raw: i32 = value.into();
        assert_eq!(SetOrToggle::try_from(raw).ok(), Some(value));
    }
});
