use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::error::ApiResult;
use crate::metrics::PromSink;

const INDEX_PAGE: &str = "<html><body>\nPhilips Hue to Prometheus exporter.\n</body></html>\n";

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn metrics(State(sink): State<Arc<PromSink>>) -> Response {
    match sink.render() {
        Ok(text) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response(),
        Err(err) => {
            log::error!("Failed to render metrics: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

#[must_use]
pub fn router(sink: Arc<PromSink>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .with_state(sink)
}

/// Serve the scrape endpoint until shutdown is signaled.
pub async fn serve(
    listener: TcpListener,
    sink: Arc<PromSink>,
    mut shutdown: watch::Receiver<bool>,
) -> ApiResult<()> {
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(sink))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::metrics::{DeviceLabels, GaugeKind, MetricSink, PromSink};

    #[test]
    fn rendered_metrics_include_published_series() {
        let sink = Arc::new(PromSink::new().unwrap());
        sink.set_gauge(
            GaugeKind::LightOn,
            &DeviceLabels::new("Hallway", "id-h"),
            1.0,
        );

        let out = sink.render().unwrap();
        assert!(out.contains("hue_light_on{name=\"Hallway\",uniqueid=\"id-h\"} 1"));
    }
}
