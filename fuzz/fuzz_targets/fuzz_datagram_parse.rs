#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_messages::{classify, Datagram, Envelope, Ping};

// Arbitrary datagrams must never panic the parsers, and whatever parses
// must survive a repack.
fuzz_target!(|data: &[u8]| {
    let _ = Ping::parse(data);

    match classify(data) {
        Ok(Datagram::Ping(ping)) => {
            assert!(Ping::matches(data));
            let again = Ping::parse(&ping.to_bytes()).expect("repacked ping parses");
            assert_eq!(again, ping);
        }
        Ok(Datagram::Message(envelope)) => {
            let _ = envelope.verify_signature();
            let _ = envelope.payload.ident();
            let _ = envelope.payload.height();
            if let Ok(packed) = envelope.pack() {
                let again = Envelope::parse(&packed).expect("repacked envelope parses");
                assert_eq!(again, envelope);
            }
        }
        Err(_) => {}
    }
});
