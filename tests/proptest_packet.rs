use proptest::prelude::*;

use dhcplet::DhcpMessage;

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_FIXED_HEADER_SIZE: usize = 240;

fn valid_header() -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];
    packet[0] = 1;
    packet[1] = 1;
    packet[2] = 6;
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    packet
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    #[test]
    fn parse_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = DhcpMessage::parse(&data);
    }

    #[test]
    fn parse_never_panics_on_valid_header_with_random_options(
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut packet = valid_header();
        packet.extend_from_slice(&options_data);
        let _ = DhcpMessage::parse(&packet);
    }

    #[test]
    fn parse_never_panics_on_random_option_lengths(
        option_code in 1u8..254,
        option_length in any::<u8>(),
        option_data in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut packet = valid_header();
        packet.push(option_code);
        packet.push(option_length);
        let actual_len = (option_length as usize).min(option_data.len());
        packet.extend_from_slice(&option_data[..actual_len]);
        packet.push(255);
        let _ = DhcpMessage::parse(&packet);
    }

    #[test]
    fn roundtrip_encode_decode_preserves_data(
        xid in any::<u32>(),
        secs in any::<u16>(),
        flags in any::<u16>(),
        ciaddr in any::<[u8; 4]>(),
        yiaddr in any::<[u8; 4]>(),
        siaddr in any::<[u8; 4]>(),
        giaddr in any::<[u8; 4]>(),
        chaddr in any::<[u8; 16]>(),
        requested in any::<[u8; 4]>(),
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[8..10].copy_from_slice(&secs.to_be_bytes());
        packet[10..12].copy_from_slice(&flags.to_be_bytes());
        packet[12..16].copy_from_slice(&ciaddr);
        packet[16..20].copy_from_slice(&yiaddr);
        packet[20..24].copy_from_slice(&siaddr);
        packet[24..28].copy_from_slice(&giaddr);
        packet[28..44].copy_from_slice(&chaddr);
        packet.extend_from_slice(&[53, 1, 1]);
        packet.push(50);
        packet.push(4);
        packet.extend_from_slice(&requested);
        packet.push(255);

        let parsed = DhcpMessage::parse(&packet).unwrap();
        let encoded = parsed.encode();
        let reparsed = DhcpMessage::parse(&encoded).unwrap();

        prop_assert_eq!(&parsed, &reparsed);
        prop_assert_eq!(reparsed.xid, xid);
        prop_assert_eq!(reparsed.secs, secs);
        prop_assert_eq!(reparsed.flags, flags);
        prop_assert_eq!(reparsed.chaddr, chaddr);
        prop_assert_eq!(reparsed.options.len(), 2);
    }

    #[test]
    fn reencoding_an_encoded_packet_is_identical(
        xid in any::<u32>(),
        chaddr in any::<[u8; 16]>(),
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[28..44].copy_from_slice(&chaddr);
        packet.extend_from_slice(&[53, 1, 3, 255]);

        let encoded = DhcpMessage::parse(&packet).unwrap().encode();
        let reencoded = DhcpMessage::parse(&encoded).unwrap().encode();
        prop_assert_eq!(encoded, reencoded);
    }

    #[test]
    fn valid_packets_always_encode_to_at_least_300_bytes(
        xid in any::<u32>()
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet.push(255);

        if let Ok(parsed) = DhcpMessage::parse(&packet) {
            let encoded = parsed.encode();
            prop_assert!(encoded.len() >= 300);
        }
    }

    #[test]
    fn short_packets_always_rejected(
        data in prop::collection::vec(any::<u8>(), 0..240)
    ) {
        let result = DhcpMessage::parse(&data);
        prop_assert!(result.is_err());
    }

    #[test]
    fn bad_magic_cookie_always_rejected(
        cookie in any::<[u8; 4]>()
    ) {
        prop_assume!(cookie != DHCP_MAGIC_COOKIE);

        let mut packet = valid_header();
        packet[236..240].copy_from_slice(&cookie);
        packet.push(255);

        let result = DhcpMessage::parse(&packet);
        prop_assert!(result.is_err());
    }
}
