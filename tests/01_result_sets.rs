mod support;

use support::{
    Harness, ONE_TARGET, diagnostic_of, present, present_response, records, search,
    search_response,
};
use zcrab::wire_protocol::{Body, Pdu, Records};

#[test]
fn repeated_large_search_is_answered_locally() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 500);

    for _ in 0..2 {
        h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 water"))));
        assert!(h.take(target).is_empty());

        let answer = h.take(client);
        match &answer[0].body {
            Body::SearchResponse(res) => {
                assert_eq!(res.result_count, 500);
                assert_eq!(res.returned, 0);
                assert!(res.status);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn a_different_query_goes_to_the_target() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 500);

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 fire"))));
    assert_eq!(h.take(target).len(), 1);
}

#[test]
fn optimization_can_be_switched_off() {
    let mut h = Harness::from_toml(&format!("[gateway]\noptimize = false\n{ONE_TARGET}"));
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 500);

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 water"))));
    assert_eq!(h.take(target).len(), 1);
}

#[test]
fn present_from_an_unknown_set_is_refused() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();

    h.send(client, present("nope", 1, 1).with_reference_id(Some("p".into())));

    assert!(h.take(target).is_empty());
    let answer = h.take(client);
    assert_eq!(answer[0].header.reference_id.as_deref(), Some("p"));
    assert!(matches!(answer[0].body, Body::PresentResponse(_)));
    assert_eq!(diagnostic_of(&answer[0]), Some((30, Some("nope".into()))));
}

#[test]
fn present_past_the_hit_count_is_refused() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 5);

    h.send(client, present("default", 4, 3));

    assert!(h.take(target).is_empty());
    assert_eq!(diagnostic_of(&h.take(client)[0]), Some((13, None)));
}

#[test]
fn presented_records_are_served_again_from_cache() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 5);

    h.send(client, present("default", 1, 2));
    assert_eq!(h.take(target).len(), 1);
    h.send(target, present_response(records(2)));
    let first = h.take(client);

    h.send(client, present("default", 1, 2));
    assert!(h.take(target).is_empty());
    let second = h.take(client);

    match &first[0].body {
        Body::PresentResponse(res) => assert_eq!(res.records, Records::Database(records(2))),
        other => panic!("unexpected {other:?}"),
    }
    match &second[0].body {
        Body::PresentResponse(res) => {
            assert_eq!(res.returned, 2);
            assert_eq!(res.next_position, 3);
            assert_eq!(res.records, Records::Database(records(2)));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn medium_set_repeat_fetches_records_with_a_present() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();

    let mut req = search("@attr 1=4 water");
    req.large_set_lower_bound = 100;
    req.medium_set_present_number = 3;
    h.search_with_hits(client, target, req.clone(), 10);

    h.send(client, Pdu::new(Body::SearchRequest(req)));
    let forwarded = h.take(target);
    match &forwarded[0].body {
        Body::PresentRequest(p) => {
            assert_eq!((p.start, p.count), (1, 3));
            assert_eq!(p.result_set_id, "default");
        }
        other => panic!("unexpected {other:?}"),
    }

    h.send(target, present_response(records(3)));
    match &h.take(client)[0].body {
        Body::SearchResponse(res) => {
            assert_eq!(res.result_count, 10);
            assert_eq!(res.returned, 3);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn failed_search_is_not_a_reference_for_repeats() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 water"))));
    h.take(target);
    h.send(
        target,
        search_response(
            0,
            Records::Diagnostic {
                code: 114,
                addinfo: None,
            },
        ),
    );
    h.take(client);

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 water"))));
    assert_eq!(h.take(target).len(), 1);
}

#[test]
fn unsupported_attributes_never_reach_the_target() {
    let mut h = Harness::from_toml(&format!(
        "{ONE_TARGET}\n[[targets.attributes]]\ntype = \"1\"\nvalue = \"1-1000\"\n\n[[targets.attributes]]\ntype = \"1\"\nvalue = \"*\"\nerror = 114\n"
    ));
    let (client, target) = h.handshake();

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=9999 water"))));

    assert!(h.take(target).is_empty());
    assert_eq!(
        diagnostic_of(&h.take(client)[0]),
        Some((114, Some("9999".into())))
    );
}

#[test]
fn retrieval_limit_clamps_present_size() {
    let mut h = Harness::from_toml(&format!("{ONE_TARGET}\n[targets.limit]\nretrieve = 2\n"));
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 10);

    h.send(client, present("default", 1, 5));

    match &h.take(target)[0].body {
        Body::PresentRequest(p) => assert_eq!(p.count, 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn pipelined_searches_settle_in_order() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 water"))));
    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 fire"))));
    assert_eq!(h.take(target).len(), 2);

    h.send(target, search_response(7, Records::None));
    h.send(target, search_response(9, Records::None));
    let counts: Vec<_> = h
        .take(client)
        .into_iter()
        .map(|p| match p.body {
            Body::SearchResponse(r) => r.result_count,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(counts, vec![7, 9]);

    h.send(client, Pdu::new(Body::SearchRequest(search("@attr 1=4 fire"))));
    assert!(h.take(target).is_empty());
    match &h.take(client)[0].body {
        Body::SearchResponse(r) => assert_eq!(r.result_count, 9),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn present_window_beyond_record_positions_is_refused() {
    let mut h = Harness::from_toml(ONE_TARGET);
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 5_000_000_000);

    h.send(client, present("default", i32::MAX - 1, 10));

    assert!(h.take(target).is_empty());
    let answer = h.take(client);
    assert_eq!(diagnostic_of(&answer[0]).map(|(code, _)| code), Some(13));
}

#[test]
fn retrieval_limit_beyond_i32_does_not_clamp() {
    let mut h = Harness::from_toml(&format!(
        "{ONE_TARGET}\n[targets.limit]\nretrieve = 3000000000\n"
    ));
    let (client, target) = h.handshake();
    h.search_with_hits(client, target, search("@attr 1=4 water"), 10);

    h.send(client, present("default", 1, 5));

    match &h.take(target)[0].body {
        Body::PresentRequest(p) => assert_eq!(p.count, 5),
        other => panic!("unexpected {other:?}"),
    }
}
