// Lambda entry point. The platform execs this binary as `bootstrap`
// inside the sandbox; everything interesting lives in the runtime
// crate, this file just wires a handler into the loop.

use bolt_lambda_runtime::{run_buffered, Context, HandlerError};

/// Demonstration handler: echoes invocation metadata back as JSON.
/// Replace the body with your function; the runtime hands you the raw
/// event bytes and posts back whatever you return.
fn handler(ctx: &Context<'_>, event: &[u8]) -> Result<Vec<u8>, HandlerError> {
    ctx.log()
        .info(&format!("handling {} byte event", event.len()));

    let preview = ctx
        .arena()
        .alloc_slice(&event[..event.len().min(256)]);

    let response = serde_json::json!({
        "statusCode": 200,
        "requestId": ctx.request().request_id,
        "function": ctx.config().function_name,
        "eventPreview": String::from_utf8_lossy(preview),
    });

    Ok(response.to_string().into_bytes())
}

fn main() {
    if let Err(err) = run_buffered(handler) {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}
