// tests/repetition_detector.rs

use lead_nurture_engine::repetition::{check, JACCARD_THRESHOLD, WINDOW};

#[test]
fn identical_message_twice_is_flagged() {
    let msg = "Hi Ada, how are the mortgage documents coming along?";
    assert!(!check(msg, &[]).repetitive);
    let verdict = check(msg, &[msg]);
    assert!(verdict.repetitive);
    assert!(verdict.reason.unwrap().contains("identical"));
}

#[test]
fn near_duplicate_wording_is_flagged() {
    let verdict = check(
        "Hi Ada, just wondering if you had a chance to look at the rates",
        &["Hi Ada just wondering if you had a chance to look at rates"],
    );
    assert!(verdict.repetitive, "expected > {JACCARD_THRESHOLD} overlap");
}

#[test]
fn formulaic_opener_is_flagged_across_different_bodies() {
    let recent = [
        "Hope you're doing well! Just wanted to check in on the updated rates from the lender.",
        "Hope you're doing well! Just wanted to check in on your document upload.",
    ];
    let verdict = check(
        "Hope you're doing well! Just wanted to check in on whether Thursday works for a chat.",
        &recent,
    );
    assert!(verdict.repetitive);
    assert!(verdict.reason.unwrap().contains("opening"));
}

#[test]
fn genuinely_fresh_content_passes() {
    let recent = [
        "Your appointment with Greg is confirmed for Thursday at 2pm.",
        "The lender approved the updated valuation today.",
        "Could you upload the last three payslips when you get a minute?",
    ];
    let verdict = check(
        "One more thing: do you want the illustration emailed or posted?",
        &recent,
    );
    assert!(!verdict.repetitive);
}

#[test]
fn window_only_covers_recent_messages() {
    let old = "A message from a long time ago about stamp duty.";
    let mut recent: Vec<&str> = vec![
        "first filler text mentioning rates",
        "second filler text covering income checks and paperwork",
        "third filler note regarding the survey booking",
        "fourth filler covering solicitor details",
        "fifth filler asking for proof of deposit",
    ];
    recent.push(old); // position 6, outside the window
    assert_eq!(recent.len(), WINDOW + 1);
    assert!(!check(old, &recent).repetitive);
}
