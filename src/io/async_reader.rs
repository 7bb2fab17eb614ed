//! Asynchronous CSV reader for payment requests
//!
//! Provides a batch reading interface over payment requests from a CSV file.
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of PaymentRequests
//!                  ↓
//!           csv_format module
//!           (RequestRecord, convert_request_record)
//! ```

use crate::io::csv_format::{convert_request_record, RequestRecord};
use crate::types::PaymentRequest;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
///
/// Keeps streaming behavior with constant memory usage per batch.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    skipped: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            skipped: 0,
        }
    }

    /// Number of rows skipped so far because they were malformed
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Read a batch of payment requests
    ///
    /// Reads up to `batch_size` requests. Malformed rows are logged and
    /// skipped.
    ///
    /// # Returns
    ///
    /// The successfully converted requests; an empty vector at end of file.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<PaymentRequest> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<RequestRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => match convert_request_record(record) {
                    Ok(request) => batch.push(request),
                    Err(e) => {
                        self.skipped += 1;
                        warn!(error = %e, "Skipping payment request");
                    }
                },
                Some(Err(e)) => {
                    self.skipped += 1;
                    warn!(
                        line = e.position().map(|p| p.line()),
                        error = %e,
                        "Skipping malformed CSV row"
                    );
                }
                None => break,
            }
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use rust_decimal::Decimal;

    const HEADER: &str = "user,product,price,currency,sender\n";

    #[tokio::test]
    async fn test_async_reader_read_batch() {
        let csv_content = format!(
            "{HEADER}u1,bike,100.00,USD,$w/a\n,bell,5.00,usd,$w/b\nu2,lamp,12.50,EUR,$w/c\n"
        );
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].user, "u1");
        assert_eq!(batch[0].price, Decimal::new(10000, 2));
        assert_eq!(batch[1].user, "anonymous");
        assert_eq!(batch[1].target_currency, "USD");

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].product, "lamp");

        assert!(reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_empty_csv() {
        let mut reader = AsyncReader::new(Cursor::new(HEADER.as_bytes()));

        assert!(reader.read_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_skips_invalid_rows() {
        let csv_content = format!(
            "{HEADER}u1,bike,abc,USD,$w/a\nu1,bike,1.00,USD\nu2,lamp,1.00,USD,$w/c\n"
        );
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let batch = reader.read_batch(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].user, "u2");
        assert_eq!(reader.skipped(), 2);
    }

    #[tokio::test]
    async fn test_async_reader_whitespace_handling() {
        let csv_content = format!("{HEADER}  u1  ,  bike  ,  100.00  ,  usd  ,  $w/a  \n");
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let batch = reader.read_batch(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].product, "bike");
        assert_eq!(batch[0].sender_pointer, "$w/a");
    }
}
