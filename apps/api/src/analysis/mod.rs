// CV analysis: prompt → ModelInvoker → response parser → contract assembly.
// All LLM calls go through llm_client — no direct provider calls here.

pub mod contract;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
