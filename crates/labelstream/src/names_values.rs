//! Streaming of label names with their values.
//!
//! Label names are visited in the index's sorted order and their values are
//! packed into [`NameValuesBatch`]es. A batch is flushed as soon as the
//! accounted size (label name bytes plus value bytes) reaches the threshold, so
//! a single label's value list can be split across consecutive batches.

use crate::{
    Error, LabelValues, Matcher, NameValuesBatch, ResponseSink, Result, index::IndexReader,
    telemetry::increment_batches_sent,
};

/// Streams the label names matching `matchers` together with their values.
///
/// Batches are sent the moment their accounted size reaches
/// `message_size_threshold`; whatever is left is sent once all names are
/// processed. A name whose own length trips the threshold first flushes what
/// is pending from earlier names, then starts the next batch with its own
/// values. A single name/value pair larger than the threshold still goes out
/// as its own batch. Empty batches are never sent.
///
/// Cancellation is checked once per label name. Index reads run inline on the
/// calling task and are not interrupted.
///
/// # Errors
///
/// Index and sink errors are returned unchanged and end the stream. Batches
/// already sent are not retracted. Returns [`Error::Cancelled`] if the sink's
/// token fires.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(skip_all, fields(matchers = matchers.len(), threshold = message_size_threshold))
)]
pub async fn label_names_and_values<I, S>(
    index: &I,
    matchers: &[Matcher],
    message_size_threshold: usize,
    sink: &mut S,
) -> Result<()>
where
    I: IndexReader + ?Sized,
    S: ResponseSink<NameValuesBatch>,
{
    let label_names = index.label_names(matchers)?;

    let mut batch = NameValuesBatch::default();
    let mut batch_size = 0_usize;

    for label_name in label_names {
        if sink.cancellation_token().is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Cancelled before label {label_name:?}");
            return Err(Error::Cancelled);
        }

        // The name is repeated in every batch that carries any of its values.
        batch_size += label_name.len();
        if batch_size >= message_size_threshold {
            if !batch.is_empty() {
                flush(sink, &mut batch).await?;
            }
            batch_size = label_name.len();
        }

        let values = index.label_values(&label_name, matchers)?;
        let total = values.len();

        let mut pending = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            let is_last = i + 1 == total;
            batch_size += value.len();
            pending.push(value);

            if batch_size >= message_size_threshold {
                batch
                    .items
                    .push(LabelValues::new(label_name.clone(), core::mem::take(&mut pending)));
                flush(sink, &mut batch).await?;

                // Remaining values of this label go out under its name again.
                batch_size = if is_last { 0 } else { label_name.len() };
            } else if is_last {
                batch
                    .items
                    .push(LabelValues::new(label_name.clone(), core::mem::take(&mut pending)));
            }
        }
    }

    if !batch.is_empty() {
        flush(sink, &mut batch).await?;
    }

    Ok(())
}

async fn flush<S>(sink: &mut S, batch: &mut NameValuesBatch) -> Result<()>
where
    S: ResponseSink<NameValuesBatch>,
{
    let batch = core::mem::take(batch);

    #[cfg(feature = "tracing")]
    tracing::trace!(
        items = batch.items.len(),
        bytes = batch.size_bytes(),
        "Flushing names/values batch"
    );

    sink.send(batch).await?;
    increment_batches_sent();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, StaticIndex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn lv(name: &str, values: &[&str]) -> LabelValues {
        LabelValues::new(name, values.iter().map(|v| v.to_string()).collect())
    }

    #[tokio::test]
    async fn label_names_and_values_are_sent_in_batches() {
        let long_name = "label-ee".repeat(10);
        let index = StaticIndex::new(&[
            ("label-aa", &["a0000000", "a1111111", "a2222222"]),
            ("label-bb", &["b0000000", "b1111111", "b2222222", "b3333333"]),
            ("label-c", &["c0000000"]),
            ("label-dd", &["d0000000"]),
            (long_name.as_str(), &["e0000000"]),
            ("label-ff", &["f0000000", "f1111111", "f2222222"]),
            ("label-gg", &["g0000000"]),
        ]);
        let mut sink = RecordingSink::new();

        label_names_and_values(&index, &[], 32, &mut sink).await.unwrap();

        let sent: Vec<_> = sink.sent.iter().map(|b| b.items.clone()).collect();
        assert_eq!(
            sent,
            vec![
                vec![lv("label-aa", &["a0000000", "a1111111", "a2222222"])],
                vec![lv("label-bb", &["b0000000", "b1111111", "b2222222"])],
                vec![lv("label-bb", &["b3333333"]), lv("label-c", &["c0000000"])],
                vec![lv("label-dd", &["d0000000"])],
                vec![lv(&long_name, &["e0000000"])],
                vec![lv("label-ff", &["f0000000", "f1111111", "f2222222"])],
                vec![lv("label-gg", &["g0000000"])],
            ]
        );
    }

    #[tokio::test]
    async fn all_values_fit_in_a_single_message() {
        for labels in [
            vec![("label-a", &["val-0"][..])],
            vec![
                ("label-a", &["val-0", "val-1", "val-2"][..]),
                ("label-b", &["val-0", "val-1", "val-2", "val-3"][..]),
            ],
        ] {
            let index = StaticIndex::new(&labels);
            let mut sink = RecordingSink::new();

            label_names_and_values(&index, &[], 128, &mut sink).await.unwrap();

            let expected: Vec<_> = labels.iter().map(|(n, v)| lv(n, v)).collect();
            assert_eq!(sink.sent.len(), 1);
            assert_eq!(sink.sent[0].items, expected);
        }
    }

    #[tokio::test]
    async fn empty_index_sends_nothing() {
        let index = StaticIndex::new(&[]);
        let mut sink = RecordingSink::new();
        label_names_and_values(&index, &[], 32, &mut sink).await.unwrap();
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn names_without_values_count_towards_size_but_send_nothing() {
        let index = StaticIndex::new(&[("aaaa", &[]), ("bbbb", &["v1"]), ("cccc", &[])]);
        let mut sink = RecordingSink::new();

        label_names_and_values(&index, &[], 6, &mut sink).await.unwrap();

        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].items, vec![lv("bbbb", &["v1"])]);
    }

    #[tokio::test]
    async fn only_empty_value_lists_send_nothing() {
        let index = StaticIndex::new(&[("aaaa", &[]), ("bbbb", &[]), ("cccc", &[])]);
        for threshold in [1, 6, 1024] {
            let mut sink = RecordingSink::new();
            label_names_and_values(&index, &[], threshold, &mut sink).await.unwrap();
            assert!(sink.sent.is_empty(), "threshold {threshold} sent {:?}", sink.sent);
        }
    }

    #[tokio::test]
    async fn oversized_first_name_does_not_send_empty_batch() {
        let index = StaticIndex::new(&[("a-very-long-label-name", &["v"]), ("b", &["w"])]);
        let mut sink = RecordingSink::new();

        label_names_and_values(&index, &[], 4, &mut sink).await.unwrap();

        let sent: Vec<_> = sink.sent.iter().map(|b| b.items.clone()).collect();
        assert_eq!(
            sent,
            vec![
                vec![lv("a-very-long-label-name", &["v"])],
                vec![lv("b", &["w"])],
            ]
        );
    }

    #[tokio::test]
    async fn values_are_complete_and_never_duplicated() {
        let values: Vec<String> = (0..250).map(|i| format!("value-{i:04}")).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let index = StaticIndex::new(&[("alpha", &refs[..100]), ("beta", &refs[100..])]);

        for threshold in [1, 7, 10, 33, 64, 1000, 1 << 20] {
            let mut sink = RecordingSink::new();
            label_names_and_values(&index, &[], threshold, &mut sink).await.unwrap();

            let mut alpha = Vec::new();
            let mut beta = Vec::new();
            for batch in &sink.sent {
                assert!(!batch.is_empty());
                for item in &batch.items {
                    match item.label_name.as_str() {
                        "alpha" => alpha.extend(item.values.iter().cloned()),
                        "beta" => beta.extend(item.values.iter().cloned()),
                        other => panic!("unexpected label {other}"),
                    }
                }
            }
            assert_eq!(alpha, values[..100], "threshold {threshold}");
            assert_eq!(beta, values[100..], "threshold {threshold}");
        }
    }

    #[tokio::test]
    async fn index_errors_abort_the_stream() {
        let index = StaticIndex::new(&[("a", &["1"]), ("b", &["2"])]).fail_values_for("b");
        let mut sink = RecordingSink::new();

        let err = label_names_and_values(&index, &[], 1, &mut sink).await.unwrap_err();

        assert_eq!(err, Error::index_read("label values unavailable for b"));
        // The batch for `a` tripped the threshold before `b` was read.
        assert_eq!(sink.sent.len(), 1);
    }

    #[tokio::test]
    async fn sink_errors_abort_the_stream() {
        let index = StaticIndex::new(&[("a", &["1"]), ("b", &["2"]), ("c", &["3"])]);
        let mut sink = RecordingSink::new().fail_on_send(1);

        let err = label_names_and_values(&index, &[], 1, &mut sink).await.unwrap_err();

        assert!(matches!(err, Error::ChannelError { .. }));
        assert_eq!(sink.sent.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_between_labels_stops_without_flushing() {
        let index = StaticIndex::new(&[("a", &["1"]), ("b", &["2"]), ("c", &["3"])]);
        let mut sink = RecordingSink::new().cancel_after_sends(1);

        let err = label_names_and_values(&index, &[], 1, &mut sink).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(sink.sent.len(), 1);
    }

    #[tokio::test]
    async fn context_cancellation_returns_promptly() {
        let values: Vec<String> = (0..100).map(|j| format!("val-{j}")).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let index = StaticIndex::new(&[("__name__", &refs)]).with_delay(Duration::from_millis(100));

        let cancel = CancellationToken::new();
        let mut sink = RecordingSink::with_token(cancel.clone());
        let handle = tokio::spawn(async move {
            label_names_and_values(&index, &[], 1024 * 1024, &mut sink).await
        });

        cancel.cancel();

        let res = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stream did not stop after cancellation")
            .unwrap();
        assert_eq!(res, Err(Error::Cancelled));
    }
}
