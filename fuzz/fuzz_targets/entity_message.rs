#![no_main]

use codec::WorldBounds;
use libfuzzer_sys::fuzz_target;
use wire::{decode_header, validate_sender, EntityMessage, Limits, PeerId};

fuzz_target!(|data: &[u8]| {
    let bounds = WorldBounds::default();
    let limits = Limits::default();

    let header = decode_header(data);
    let message = EntityMessage::decode(data, &bounds, &limits);

    // A full decode implies the header decodes to the same id and opcode.
    if let Ok(message) = message {
        assert_eq!(header.ok(), Some(message.header()));
        assert!(validate_sender(&message.header(), message.id()).is_ok());
        let other = PeerId::new(message.id().raw() ^ 1);
        assert!(validate_sender(&message.header(), other).is_err());

        // Re-encoding a decoded message is stable.
        if let Ok(bytes) = message.encode(&bounds, &limits) {
            if let Ok(again) = EntityMessage::decode(&bytes, &bounds, &limits) {
                assert_eq!(again.header(), message.header());
            }
        }
    }
});
