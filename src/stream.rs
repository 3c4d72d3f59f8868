//! Raw access to streaming endpoints.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::resource::Verb;
use crate::scheduler::{RequestOptions, RequestParams, Scheduler};

/// Number of body chunks buffered before the connection is back-pressured.
const STREAM_BUFFER: usize = 64;

/// Stream of response body chunks. A failure arrives as the last item.
pub type BodyStream = ReceiverStream<Result<Vec<u8>>>;

/// Streaming API.
#[derive(Debug, Clone, Copy)]
pub struct StreamApi<'a> {
    scheduler: &'a Scheduler,
}

impl<'a> StreamApi<'a> {
    pub fn new(scheduler: &'a Scheduler) -> Self {
        Self { scheduler }
    }

    /// Open any endpoint and stream its body as it arrives.
    ///
    /// The request skips the queue. Nothing is parsed; a non-2xx answer
    /// ends the stream with an HTTP error.
    pub fn raw(
        &self,
        verb: Verb,
        url: &str,
        params: RequestParams,
        mut options: RequestOptions,
    ) -> Result<BodyStream> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        options.skip_queue = true;
        options.stream = Some(tx);

        self.scheduler.enqueue(verb, url, params, options, None)?;
        Ok(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuth;
    use crate::config::BirdcallConfig;
    use crate::error::BirdcallError;
    use crate::test_utils::StubTransport;
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    fn scheduler(transport: &Arc<StubTransport>) -> Scheduler {
        let mut config = BirdcallConfig::default();
        config.urls.rest_base = "https://stream.example.com/1.1".to_string();
        config.scheduler.eager_dispatch = false;
        config.scheduler.refresh_jobs = false;
        Scheduler::new(&config, transport.clone(), Arc::new(NoAuth)).unwrap()
    }

    #[tokio::test]
    async fn test_raw_stream_delivers_body() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(200, "{\"text\":\"one\"}\r\n{\"text\":\"two\"}\r\n");
        let scheduler = scheduler(&transport);

        let mut stream = StreamApi::new(&scheduler)
            .raw(
                Verb::Post,
                "statuses/filter",
                RequestParams::new().content("track=rust"),
                RequestOptions::default(),
            )
            .unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend(chunk.unwrap());
        }

        assert_eq!(
            String::from_utf8(body).unwrap(),
            "{\"text\":\"one\"}\r\n{\"text\":\"two\"}\r\n"
        );
        // Dispatched even though eager dispatch is off
        assert_eq!(scheduler.queue_depth().pending, 0);
    }

    #[tokio::test]
    async fn test_raw_stream_ends_with_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(401, "Unauthorized");
        let scheduler = scheduler(&transport);

        let mut stream = StreamApi::new(&scheduler)
            .raw(Verb::Get, "statuses/sample", RequestParams::new(), RequestOptions::default())
            .unwrap();

        match stream.next().await {
            Some(Err(BirdcallError::Http(e))) => assert_eq!(e.status, 401),
            other => panic!("unexpected item {:?}", other),
        }
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_raw_stream_rejects_absolute_url() {
        let transport = Arc::new(StubTransport::new());
        let scheduler = scheduler(&transport);

        let result = StreamApi::new(&scheduler).raw(
            Verb::Get,
            "https://stream.twitter.com/1.1/statuses/sample.json",
            RequestParams::new(),
            RequestOptions::default(),
        );
        assert!(matches!(result, Err(BirdcallError::Argument { .. })));
    }
}
