use lsp_types::{
    ClientCapabilities, CompletionOptions, PositionEncodingKind, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind,
};

/// Capabilities advertised in the initialize result
///
/// Positions are counted in Unicode scalar values, which is the `utf-32`
/// encoding; it is only announced to clients that list it.
pub fn server_capabilities(client: &ClientCapabilities) -> ServerCapabilities {
    ServerCapabilities {
        position_encoding: supports_utf32(client).then_some(PositionEncodingKind::UTF32),
        text_document_sync: Some(TextDocumentSyncCapability::Kind(
            TextDocumentSyncKind::INCREMENTAL,
        )),
        completion_provider: Some(CompletionOptions {
            resolve_provider: Some(false),
            trigger_characters: Some(Vec::new()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn supports_utf32(client: &ClientCapabilities) -> bool {
    client
        .general
        .as_ref()
        .and_then(|general| general.position_encodings.as_ref())
        .is_some_and(|encodings| encodings.contains(&PositionEncodingKind::UTF32))
}
