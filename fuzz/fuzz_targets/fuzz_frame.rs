#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a length-prefixed frame: must never panic, and a
    // frame that decodes must encode back to the same message.
    if let Ok(message) = duel_client::codec::decode_frame(data) {
        let reencoded = duel_client::codec::encode_frame(&message);
        if let Ok(bytes) = reencoded {
            let again = duel_client::codec::decode_frame(&bytes);
            assert_eq!(again.ok(), Some(message));
        }
    }

    // The bare JSON body path.
    let _ = serde_json::from_slice::<duel_client::protocol::Message>(data);
});
