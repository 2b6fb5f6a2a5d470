#![no_main]

use bitstream::BitReader;
use codec::{unpack_dirty, SyncAscii, SyncFloat, SyncInt, SyncString, SyncVar};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (Ok(mut health), Ok(mut heading), Ok(mut name), Ok(mut tag)) = (
        SyncInt::with_slot(0, 0),
        SyncFloat::with_slot(1, 0.0),
        SyncString::with_slot(2, String::new()),
        SyncAscii::with_slot(5, String::new()),
    ) else {
        return;
    };

    let mut reader = BitReader::new(data);
    let mut vars: [&mut dyn SyncVar; 4] = [&mut health, &mut heading, &mut name, &mut tag];
    if let Ok(changed) = unpack_dirty(&mut vars, &mut reader) {
        // Only slots that exist can be reported as changed.
        assert_eq!(changed.bits() & !0b10_0111, 0);
    }
});
