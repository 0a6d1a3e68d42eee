//! Decoder-level properties exercised through the public API.

use betstream::cache::MarketBook;
use betstream::domain::{MarketId, SelectionId};
use betstream::protocol::SegmentLimits;
use betstream::{Decoder, StreamEvent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod support;

fn decoder() -> Decoder {
    Decoder::new(Decimal::ONE, SegmentLimits::default())
}

fn feed(decoder: &mut Decoder, lines: &[&str]) {
    for line in lines {
        decoder.process_line(line, true);
        decoder.clear_deltas();
    }
}

fn assert_no_zero_sizes(book: &MarketBook) {
    for runner in book.runners().values() {
        for ladder in [
            runner.available_to_back(),
            runner.available_to_lay(),
            runner.sp_back(),
            runner.sp_lay(),
            runner.traded(),
        ] {
            assert!(
                ladder.iter().all(|(_, size)| !size.is_zero()),
                "zero size left in a full-depth ladder"
            );
        }
        for best in [
            runner.best_to_back(),
            runner.best_to_lay(),
            runner.best_display_to_back(),
            runner.best_display_to_lay(),
        ] {
            assert!(
                best.iter().all(|(_, quote)| !quote.size.is_zero()),
                "zero size left in a best ladder"
            );
        }
    }
}

#[test]
fn no_ladder_ever_holds_a_zero_size() {
    let mut d = decoder();
    feed(
        &mut d,
        &[
            r#"{"op":"mcm","id":1,"pt":1,"mc":[{"id":"1.1","img":true,"rc":[
                {"id":10,"atb":[[2.4,50],[2.5,60]],"atl":[[2.6,70]],
                 "batb":[[0,2.5,60],[1,2.4,50]],"trd":[[2.5,100]]}]}]}"#,
            r#"{"op":"mcm","id":2,"pt":2,"mc":[{"id":"1.1","rc":[
                {"id":10,"atb":[[2.4,0],[2.45,10]],"batb":[[1,2.4,0]],
                 "trd":[[2.5,0],[2.45,5]],"spb":[[3.0,20]],"spl":[[3.2,0]]}]}]}"#,
            r#"{"op":"mcm","id":3,"pt":3,"mc":[{"id":"1.1","rc":[
                {"id":10,"atb":[[2.45,0]],"atl":[[2.6,0]],"batb":[[0,0,0]]}]}]}"#,
        ],
    );

    let book = d.markets().get(&MarketId::new("1.1")).unwrap();
    assert_no_zero_sizes(book);

    // spot-check the surviving levels
    let runner = book.runner(SelectionId::new(10)).unwrap();
    assert!(runner.available_to_back().is_empty());
    assert!(runner.available_to_lay().is_empty());
    assert_eq!(runner.traded().get(&dec!(2.45)), Some(dec!(5)));
    assert_eq!(runner.sp_back().get(&dec!(3.0)), Some(dec!(20)));
}

#[test]
fn segmented_and_unsegmented_apply_identically() {
    let segments = [
        support::segment_frame(
            7,
            Some("SEG_START"),
            r#"{"id":"1.1","rc":[{"id":10,"ltp":2.0,"atb":[[1.9,5]]}]}"#,
        ),
        support::segment_frame(7, None, r#"{"id":"1.2","rc":[{"id":20,"ltp":3.0}]}"#),
        support::segment_frame(
            7,
            Some("SEG_END"),
            r#"{"id":"1.3","rc":[{"id":30,"tv":40}]}"#,
        ),
    ];
    let combined = r#"{"op":"mcm","id":7,"mc":[
        {"id":"1.1","rc":[{"id":10,"ltp":2.0,"atb":[[1.9,5]]}]},
        {"id":"1.2","rc":[{"id":20,"ltp":3.0}]},
        {"id":"1.3","rc":[{"id":30,"tv":40}]}]}"#;

    let mut segmented = decoder();
    for segment in &segments {
        segmented.process_line(segment, true);
    }
    let mut unsegmented = decoder();
    unsegmented.process_line(combined, true);

    assert_eq!(
        format!("{:?}", segmented.markets()),
        format!("{:?}", unsegmented.markets())
    );
    assert_eq!(segmented.deltas(), unsegmented.deltas());
}

#[test]
fn applying_the_same_delta_twice_is_idempotent() {
    let tick = r#"{"op":"mcm","id":1,"pt":1,"mc":[{"id":"1.1","tv":500,"rc":[
        {"id":10,"ltp":2.5,"atb":[[2.4,50]],"batb":[[0,2.4,50]],"trd":[[2.5,10]]}]}]}"#;

    let mut once = decoder();
    once.process_line(tick, true);

    let mut twice = decoder();
    twice.process_line(tick, true);
    twice.process_line(tick, true);

    assert_eq!(
        format!("{:?}", once.markets()),
        format!("{:?}", twice.markets())
    );
}

#[test]
fn deleting_an_absent_price_is_a_noop() {
    let mut d = decoder();
    feed(
        &mut d,
        &[
            r#"{"op":"mcm","id":1,"pt":1,"mc":[{"id":"1.1","rc":[{"id":10,"atb":[[2.4,50]]}]}]}"#,
            r#"{"op":"mcm","id":2,"pt":2,"mc":[{"id":"1.1","rc":[{"id":10,"atb":[[9.8,0]]}]}]}"#,
        ],
    );
    let runner = d
        .markets()
        .get(&MarketId::new("1.1"))
        .unwrap()
        .runner(SelectionId::new(10))
        .unwrap();
    assert_eq!(runner.available_to_back().len(), 1);
    assert_eq!(runner.available_to_back().get(&dec!(2.4)), Some(dec!(50)));
}

#[test]
fn unknown_op_counts_but_does_not_mutate() {
    let mut d = decoder();
    d.process_line(r#"{"op":"mcm","id":1,"pt":1,"mc":[{"id":"1.1","rc":[{"id":10,"ltp":2.0}]}]}"#, true);
    let before = format!("{:?}", d.markets());

    assert!(matches!(
        d.process_line(r#"{"op":"resync","id":4}"#, true),
        StreamEvent::Dropped
    ));
    assert_eq!(d.dropped_frames(), 1);
    assert_eq!(format!("{:?}", d.markets()), before);
}

#[test]
fn truly_complete_is_monotonic_over_a_frame_sequence() {
    let mut d = decoder();
    feed(
        &mut d,
        &[
            r#"{"op":"mcm","id":1,"pt":1,"mc":[{"id":"1.1","img":true,
                "marketDefinition":{"status":"OPEN","runners":[{"id":10,"status":"ACTIVE"}]},
                "rc":[{"id":10,"ltp":2.0}]}]}"#,
            r#"{"op":"mcm","id":2,"pt":2,"mc":[{"id":"1.1",
                "marketDefinition":{"status":"SUSPENDED","runners":[{"id":10,"status":"WINNER"}]}}]}"#,
        ],
    );
    let market = MarketId::new("1.1");
    assert!(d.markets().get(&market).unwrap().is_truly_complete());

    // every subsequent non-image frame keeps it complete
    for line in [
        r#"{"op":"mcm","id":3,"pt":3,"mc":[{"id":"1.1",
            "marketDefinition":{"status":"OPEN","runners":[{"id":10,"status":"ACTIVE"}]}}]}"#,
        r#"{"op":"mcm","id":4,"pt":4,"mc":[{"id":"1.1","rc":[{"id":10,"ltp":2.2}]}]}"#,
    ] {
        d.process_line(line, true);
        d.clear_deltas();
        assert!(d.markets().get(&market).unwrap().is_truly_complete());
    }
}

#[test]
fn order_scenarios_from_end_to_end() {
    let mut d = decoder();

    // executable order appears, completes, never disappears
    d.process_line(
        r#"{"op":"ocm","id":1,"pt":1,"oc":[{"id":"1.1","orc":[{"id":10,
            "uo":[{"id":"o1","p":12,"s":10,"side":"B","status":"E","sm":2,"sr":8}]}]}]}"#,
        true,
    );
    d.process_line(
        r#"{"op":"ocm","id":2,"pt":2,"oc":[{"id":"1.1","orc":[{"id":10,
            "uo":[{"id":"o1","p":12,"s":10,"side":"B","status":"EC","sm":10,"sr":0}]}]}]}"#,
        true,
    );
    let runner = d
        .orders()
        .get(&MarketId::new("1.1"))
        .unwrap()
        .runner(SelectionId::new(10))
        .unwrap();
    assert_eq!(runner.unmatched().len(), 1);

    // matched-back ladder delete empties the ladder
    d.process_line(
        r#"{"op":"ocm","id":3,"pt":3,"oc":[{"id":"1.1","orc":[{"id":10,"mb":[[2.5,10]]}]}]}"#,
        true,
    );
    d.process_line(
        r#"{"op":"ocm","id":4,"pt":4,"oc":[{"id":"1.1","orc":[{"id":10,"mb":[[2.5,0]]}]}]}"#,
        true,
    );
    let runner = d
        .orders()
        .get(&MarketId::new("1.1"))
        .unwrap()
        .runner(SelectionId::new(10))
        .unwrap();
    assert!(runner.matched_backs().is_empty());

    // full image with no runners removes the market entirely
    d.process_line(
        r#"{"op":"ocm","id":5,"pt":5,"oc":[{"id":"1.1","fullImage":true,"orc":[]}]}"#,
        true,
    );
    assert!(d.orders().get(&MarketId::new("1.1")).is_none());
}
