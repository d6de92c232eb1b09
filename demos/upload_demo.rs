//! Minimal CLI demonstrating the upload engine against a real HTTP endpoint.
//!
//! Usage: `upload-demo <file-path> <start-url> <chunk-url-template> <finish-url>`
//! where `<chunk-url-template>` contains a literal `{index}` placeholder.

use resumable_upload_engine::blob::FileBlob;
use resumable_upload_engine::config::StaticUploadConfig;
use resumable_upload_engine::engine::UploadEngine;
use resumable_upload_engine::events::UploadEvent;
use resumable_upload_engine::logging::{LogConfig, init_logging};
use resumable_upload_engine::transport_reqwest::ReqwestTransport;
use futures::StreamExt;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging(LogConfig::default())?;

    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: upload-demo <file> <start> <chunk-tpl> <finish>");
    let start_url = args.next().expect("missing start url");
    let chunk_url_template = args.next().expect("missing chunk url template");
    let finish_url = args.next().expect("missing finish url");

    let blob = Arc::new(FileBlob::open(&path).await?);
    let config = Arc::new(StaticUploadConfig::new(start_url, chunk_url_template, finish_url));
    let transport = Arc::new(ReqwestTransport::default());

    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport,
        config,
        blob,
        path.clone(),
        None,
    );

    let mut events = Box::pin(engine.subscribe());
    while let Some(event) = events.next().await {
        match event {
            UploadEvent::Progress(fraction) => println!("progress: {:.1}%", fraction * 100.0),
            UploadEvent::Error(message) => println!("error: {message}"),
            UploadEvent::Finish(response) => {
                println!("finished: {response}");
                break;
            }
            other => println!("{other:?}"),
        }
    }

    Ok(())
}
