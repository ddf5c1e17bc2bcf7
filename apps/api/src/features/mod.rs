// Follow-up features that reuse the CV text from a completed analysis:
// cover letter, interview preparation and job matching.
// Same pipeline as analysis: prompt → ModelInvoker → response parser → contract.

pub mod handlers;
pub mod prompts;
pub mod service;
