//! Inbound frame handling: decode on the read loop, hand off to the dispatcher.

use kis_dispatch::DispatchHandle;
use kis_feed::FrameDecoder;
use kis_ws::InboundHandler;
use tracing::trace;

/// Connects the WebSocket read loop to the dispatch queue.
pub struct FeedPipeline {
    decoder: FrameDecoder,
    dispatch: DispatchHandle,
}

impl FeedPipeline {
    pub fn new(decoder: FrameDecoder, dispatch: DispatchHandle) -> Self {
        Self { decoder, dispatch }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

impl InboundHandler for FeedPipeline {
    fn on_text(&self, text: &str) {
        for event in self.decoder.decode(text) {
            trace!(symbol = event.symbol(), kind = event.kind(), "Event decoded");
            self.dispatch.enqueue(event);
        }
    }
}
