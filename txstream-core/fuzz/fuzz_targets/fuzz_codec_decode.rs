#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use tokio_util::codec::Decoder;
use txstream_core::protocol::{ClientCodec, ServerCodec};

fuzz_target!(|data: &[u8]| {
    let mut client = ClientCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(payload)) = client.decode(&mut buf) {
        let _ = payload.iterator_id();
        let _ = payload.ends_part_sequence();
        let _ = payload.body().len();
    }

    let mut server = ServerCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(batch)) = server.decode(&mut buf) {
        let _ = batch.encoded_len();
        for request in batch.iter() {
            let _ = request.len();
        }
    }
});
