//! Prompt construction for grounded answers.

use std::path::Path;

use govrag_store::ScoredChunk;

/// Placed in the context section when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "[NO_CONTEXT]";

const INSTRUCTIONS: &str = "\
Você é um assistente que responde perguntas sobre serviços públicos.
Use somente as informações do contexto abaixo. Cite as fontes pelo número entre colchetes, por exemplo [1].
Se o contexto não contiver a resposta, diga claramente que a informação não foi encontrada nos documentos disponíveis.
Responda em português, de forma objetiva.";

/// Instruction template, numbered context passages, then the question.
pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let mut prompt = String::with_capacity(
        INSTRUCTIONS.len() + question.len() + chunks.iter().map(|c| c.chunk.text.len() + 64).sum::<usize>(),
    );
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nContexto:\n");

    if chunks.is_empty() {
        prompt.push_str(NO_CONTEXT_MARKER);
        prompt.push_str(" Nenhum trecho relevante foi encontrado.\n");
    }
    for (i, hit) in chunks.iter().enumerate() {
        prompt.push_str(&format!("[{}] (source: {}", i + 1, display_source(&hit.source)));
        if let Some(page) = hit.chunk.page {
            prompt.push_str(&format!(", page {}", page));
        }
        prompt.push_str(")\n");
        prompt.push_str(hit.chunk.text.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("\nPergunta: ");
    prompt.push_str(question.trim());
    prompt.push_str("\n\nResposta:");
    prompt
}

/// File name of a source path, or the source unchanged.
pub fn display_source(source: &str) -> &str {
    Path::new(source)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source)
}
