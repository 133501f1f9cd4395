//! Per-connection request loop

use std::sync::Arc;

use anyhow::Result;
use peci_shared::codec::{self, FrameDecoder};
use peci_shared::{Clock, PeciTransport, RawSendRequest};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::service::RawService;

/// Serve framed requests on `stream` until the peer closes it.
///
/// Requests are answered in the order they arrive. Each batch holds the
/// service lock until its response is ready, so batches from different
/// connections never interleave on the bus.
pub async fn handle_connection<S, T, C>(
    mut stream: S,
    service: Arc<Mutex<RawService<T, C>>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: PeciTransport,
    C: Clock,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 4096];

    loop {
        // Drain every complete frame before reading more
        while let Some(request) = decoder.decode_next::<RawSendRequest>()? {
            debug!(
                "Raw request: device={:?} commands={}",
                request.device,
                request.commands.len()
            );
            let response = service.lock().await.send(&request);
            stream.write_all(&codec::encode(&response)?).await?;
        }

        let n = stream.read(&mut buf).await?;
        if n == 0 {
            if decoder.buffer_len() > 0 {
                debug!("Peer closed with {} bytes of a partial frame", decoder.buffer_len());
            }
            return Ok(());
        }
        decoder.extend(&buf[..n]);
    }
}
