//! Property tests for PEM write verification: a faithful echo always
//! verifies, any corrupted echo is always caught.

mod common;

use common::{open_session, scripted_device, wire_form};
use proptest::prelude::*;
use proptest::sample::Index;
use provlink::device::DeviceError;

fn body_lines() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[A-Za-z0-9+/]{1,64}", 1..8)
}

fn assemble(lines: &[String], crlf: bool) -> Vec<u8> {
    let ending = if crlf { "\r\n" } else { "\n" };
    let mut pem = String::from("-----BEGIN CERTIFICATE-----");
    pem.push_str(ending);
    for line in lines {
        pem.push_str(line);
        pem.push_str(ending);
    }
    pem.push_str("-----END CERTIFICATE-----");
    pem.push_str(ending);
    pem.into_bytes()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn faithful_echo_passes_verification(lines in body_lines(), crlf in any::<bool>()) {
        let pem = assemble(&lines, crlf);

        let port = scripted_device(&[]);
        let mut echo = wire_form(&pem);
        echo.extend_from_slice(b"> ");
        port.reply_on(b"\r\n\r\n", &echo);

        let mut session = open_session(&port);
        prop_assert!(session.write_pem(&pem).is_ok());
    }

    #[test]
    fn corrupted_echo_fails_verification(lines in body_lines(), victim in any::<Index>()) {
        let pem = assemble(&lines, false);

        // Flip the first character of one body line in the echo.
        let mut corrupted_lines = lines.clone();
        let line = &mut corrupted_lines[victim.index(lines.len())];
        let original = line.remove(0);
        let replacement = if original == 'A' { 'B' } else { 'A' };
        line.insert(0, replacement);
        let corrupted = assemble(&corrupted_lines, false);

        let port = scripted_device(&[]);
        let mut echo = wire_form(&corrupted);
        echo.extend_from_slice(b"> ");
        port.reply_on(b"\r\n\r\n", &echo);

        let mut session = open_session(&port);
        prop_assert!(matches!(
            session.write_pem(&pem),
            Err(DeviceError::ReadbackError)
        ));
    }
}
