#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Input bytes pick a bounded sequence of operations on the same buffer.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 7;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = usize::from(data[idx - 1] % 72);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let _ = reader.read_u8();
            }
            3 => {
                let _ = reader.read_varu32();
            }
            4 => {
                let _ = reader.read_vars32();
            }
            5 => {
                let _ = reader.read_f32();
            }
            _ => {
                let _ = reader.read_string();
            }
        }
        assert!(reader.bit_position() <= data.len() * 8);
    }
});
