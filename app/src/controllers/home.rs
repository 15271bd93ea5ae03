use trellis::serde_json::json;
use trellis::{handler_fn, BoxedMiddleware};

pub fn health() -> BoxedMiddleware {
    handler_fn(|req| async move {
        let request_id = req.local("requestId").cloned().unwrap_or_default();
        trellis::json(json!({ "status": "ok", "requestId": request_id }))
    })
}
