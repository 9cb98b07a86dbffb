mod support;

use bytes::BytesMut;
use nfscout::portmap::{Mapping, PortmapClient, IPPROTO_TCP, IPPROTO_UDP};
use nfscout::xdr::{PackTo as _, Packer as _};
use std::time::Duration;
use support::{serve, Framing, Script, NULL_CRED_ARGS_OFFSET};

const TIMEOUT: Duration = Duration::from_secs(5);

fn dump_body(mappings: &[&Mapping]) -> Vec<u8> {
    let mut body = BytesMut::new();
    for mapping in mappings {
        body.pack_bool(true);
        mapping.pack_to(&mut body);
    }
    body.pack_bool(false);
    body.to_vec()
}

#[tokio::test]
async fn null_probe_succeeds() {
    let (port, _) = serve(Script {
        replies: vec![(Framing::Whole, Vec::new())],
    })
    .await;

    let mut pmap = PortmapClient::connect("127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    pmap.null().await.unwrap();
    pmap.disconnect().await.unwrap();
}

#[tokio::test]
async fn dump_suppresses_duplicates() {
    let dup = Mapping {
        prog: 100005,
        vers: 3,
        prot: IPPROTO_TCP,
        port: 20048,
    };
    let other = Mapping {
        prog: 100003,
        vers: 3,
        prot: IPPROTO_UDP,
        port: 2049,
    };

    let (port, _) = serve(Script {
        replies: vec![(Framing::Whole, dump_body(&[&dup, &dup, &other]))],
    })
    .await;

    let mut pmap = PortmapClient::connect("127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    let mappings = pmap.dump().await.unwrap();
    assert_eq!(mappings, vec![dup, other]);
}

#[tokio::test]
async fn dump_reassembles_fragmented_reply() {
    let a = Mapping {
        prog: 100000,
        vers: 2,
        prot: IPPROTO_TCP,
        port: 111,
    };
    let b = Mapping {
        prog: 100021,
        vers: 4,
        prot: IPPROTO_UDP,
        port: 46511,
    };
    let body = dump_body(&[&a, &b]);

    // reply cut into four records at awkward offsets, only the last one
    // marked final; the result must match the unfragmented decode
    let (port, _) = serve(Script {
        replies: vec![(Framing::Split(vec![3, 24, 37]), body)],
    })
    .await;

    let mut pmap = PortmapClient::connect("127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(pmap.dump().await.unwrap(), vec![a, b]);
}

#[tokio::test]
async fn getport_passes_query_and_returns_raw_port() {
    let registered: u32 = 20048;
    let unregistered: u32 = 0;

    let (port, calls) = serve(Script {
        replies: vec![
            (Framing::Whole, registered.to_be_bytes().to_vec()),
            (Framing::Whole, unregistered.to_be_bytes().to_vec()),
        ],
    })
    .await;

    let mut pmap = PortmapClient::connect("127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        pmap.getport(100005, 3, IPPROTO_TCP).await.unwrap(),
        registered
    );
    // a port of 0 comes back as-is, interpretation is the caller's problem
    assert_eq!(
        pmap.getport(100003, 3, IPPROTO_TCP).await.unwrap(),
        unregistered
    );

    let calls = calls.lock().unwrap();
    let args = &calls[0][NULL_CRED_ARGS_OFFSET..];
    assert_eq!(args.len(), 16);
    assert_eq!(u32::from_be_bytes(args[0..4].try_into().unwrap()), 100005);
    assert_eq!(u32::from_be_bytes(args[4..8].try_into().unwrap()), 3);
    assert_eq!(
        u32::from_be_bytes(args[8..12].try_into().unwrap()),
        IPPROTO_TCP
    );
    assert_eq!(u32::from_be_bytes(args[12..16].try_into().unwrap()), 0);
}
