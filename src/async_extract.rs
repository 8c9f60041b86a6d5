#![cfg(feature = "async")]

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::Error;
use crate::extract::{ExtractEvent, ExtractOptions, extractor_from_messages};
use crate::source::ContainerMessage;

/// Create a Tokio `Stream` of decoded events from an MCAP recording on disk.
///
/// Decoding is synchronous, so the extractor runs on a blocking thread
/// (`tokio::task::spawn_blocking`) and forwards events over a bounded channel, in container
/// order. `buffer` is the channel capacity.
#[cfg(feature = "mcap")]
pub fn stream_from_path(
    path: impl Into<std::path::PathBuf>,
    options: ExtractOptions,
    buffer: usize,
) -> ReceiverStream<Result<ExtractEvent, Error>> {
    let path = path.into();
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::task::spawn_blocking(move || {
        let file = match crate::source::McapFile::open(&path) {
            Ok(f) => f,
            Err(err) => {
                let _ = tx.blocking_send(Err(err));
                return;
            }
        };
        let setup = file.catalog_if_present().and_then(|catalog| {
            let selector = options.selector.resolve(&catalog)?;
            Ok((catalog, selector, file.messages()?))
        });
        let (catalog, selector, messages) = match setup {
            Ok(s) => s,
            Err(err) => {
                let _ = tx.blocking_send(Err(err));
                return;
            }
        };

        let mut extractor =
            extractor_from_messages(messages, options.selector(selector)).with_catalog(catalog);
        for item in &mut extractor {
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Like [`stream_from_path`], for any owned message stream.
///
/// The messages must be `Send + 'static` because extraction runs in `spawn_blocking`.
pub fn stream_from_messages<I>(
    messages: I,
    options: ExtractOptions,
    buffer: usize,
) -> ReceiverStream<Result<ExtractEvent, Error>>
where
    I: IntoIterator<Item = Result<ContainerMessage<'static>, Error>> + Send + 'static,
    I::IntoIter: Send,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::task::spawn_blocking(move || {
        let mut extractor = extractor_from_messages(messages, options);
        for item in &mut extractor {
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });

    ReceiverStream::new(rx)
}
