use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use http::header;
use multer::{Field, Multipart};

use crate::{
    context::RequestContext,
    error::{GatewayError, GatewayResult},
};

/// The two inputs an extraction request may carry.
#[derive(Debug, Default)]
pub struct ParseForm {
    pub file: Option<Bytes>,
    /// Trimmed; `None` when absent or blank.
    pub schema: Option<String>,
}

fn invalid_form() -> GatewayError {
    GatewayError::Validation("invalid form".to_string())
}

/// Reads the multipart body. The first `file` upload and the first `schema`
/// field win; the upload is truncated at `max_file_bytes`.
pub async fn read_form(ctx: &RequestContext, max_file_bytes: usize) -> GatewayResult<ParseForm> {
    let boundary = ctx
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(invalid_form)?;

    let mut multipart = Multipart::with_reader(Cursor::new(ctx.body.clone()), boundary);
    let mut form = ParseForm::default();
    let mut seen_schema = false;

    while let Some(field) = multipart.next_field().await.map_err(|_| invalid_form())? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") if form.file.is_none() && field.file_name().is_some() => {
                let bytes = read_capped(field, max_file_bytes).await.map_err(|err| {
                    tracing::warn!(request_id = %ctx.request_id, error = %err, "error reading file");
                    GatewayError::Validation("error reading file".to_string())
                })?;
                form.file = Some(bytes);
            }
            Some("schema") if !seen_schema => {
                seen_schema = true;
                let text = field.text().await.map_err(|_| invalid_form())?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    form.schema = Some(trimmed.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_capped(mut field: Field<'_>, cap: usize) -> Result<Bytes, multer::Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        let room = cap - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
