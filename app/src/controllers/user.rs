use trellis::serde_json::{json, Value};
use trellis::{handler_fn, BoxedMiddleware, HttpResponse};

pub fn index() -> BoxedMiddleware {
    handler_fn(|_req| async {
        trellis::json(json!({
            "users": [
                {"id": 1, "name": "John"},
                {"id": 2, "name": "Jane"}
            ]
        }))
    })
}

pub fn show() -> BoxedMiddleware {
    handler_fn(|req| async move {
        let id = req.param("id")?;
        trellis::json(json!({
            "id": id,
            "name": format!("User {}", id)
        }))
    })
}

pub fn store() -> BoxedMiddleware {
    handler_fn(|req| async move {
        let body: Value = req.json()?;
        let name = body.get("name").and_then(Value::as_str).unwrap_or("anonymous");
        HttpResponse::json(json!({ "id": 3, "name": name })).status(201).ok()
    })
}
