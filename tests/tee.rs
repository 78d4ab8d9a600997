//! Tests for `src/tee.rs`.

use coroner::tee::TeeReader;

#[tokio::test]
async fn mirror_and_buffer_match_returned_bytes() {
    let data = b"panic: divide by zero\n";
    let mut mirror = Vec::new();

    let mut tee = TeeReader::new(&data[..], &mut mirror);
    let mut returned = Vec::new();
    // A small chunk forces several reads.
    let mut chunk = [0u8; 5];
    loop {
        let n = tee.read(&mut chunk).await.expect("read should succeed");
        if n == 0 {
            break;
        }
        returned.extend_from_slice(&chunk[..n]);
    }

    assert_eq!(returned, data);
    let captured = tee.into_captured();
    assert_eq!(captured, data);
    assert_eq!(mirror, data);
}

#[tokio::test]
async fn eof_propagates_after_accumulation() {
    let data = b"ab";
    let mut mirror = Vec::new();
    let mut tee = TeeReader::new(&data[..], &mut mirror);

    let mut chunk = [0u8; 16];
    let n = tee.read(&mut chunk).await.expect("first read");
    assert_eq!(&chunk[..n], data);

    // Repeated reads at end-of-stream keep reporting 0 and never disturb
    // the accumulated bytes.
    assert_eq!(tee.read(&mut chunk).await.expect("eof read"), 0);
    assert_eq!(tee.read(&mut chunk).await.expect("eof read again"), 0);
    assert_eq!(tee.captured(), data);
}

#[tokio::test]
async fn empty_stream_accumulates_nothing() {
    let mut mirror = Vec::new();
    let mut tee = TeeReader::new(&b""[..], &mut mirror);

    let mut chunk = [0u8; 16];
    assert_eq!(tee.read(&mut chunk).await.expect("eof"), 0);
    assert!(tee.into_captured().is_empty());
    assert!(mirror.is_empty());
}
