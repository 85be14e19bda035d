#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use txstream_core::protocol::Frame;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    while !buf.is_empty() {
        match Frame::read_from(&mut buf) {
            Some(frame) => {
                let _ = frame.is_request_batch();
                let _ = frame.is_response();
                let _ = frame.is_done();
                let _ = frame.wire_size();
                let _ = frame.frame_length();
            }
            None => break,
        }
    }
});
