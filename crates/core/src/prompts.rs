//! Prompt construction for every oracle call in the system.
//!
//! Agents and the relay never assemble prompt text inline; all wording lives
//! here so the negotiation protocol stays independent of how utterances,
//! judgments, and conclusions are actually phrased.

use crate::negotiation::{Role, SessionMeta, TerminationStatus};

/// System prompt for the company (proposer) agent: a CEO negotiating a
/// funding round, reasoning from a live research briefing.
pub fn company_system_prompt(company_name: &str, briefing: &str) -> String {
    format!(
        "You are the CEO of {company_name} in a high-stakes negotiation with an \
institutional investor.\n\n\
RESEARCH ON YOUR COMPANY (from live web search):\n{briefing}\n\n\
YOUR ROLE:\n\
You are negotiating a funding round. The investor is sophisticated and will \
challenge you.\n\n\
Based on the research above, decide what valuation to propose, how much \
capital to raise, what equity to offer, and how to justify the terms with \
growth drivers and competitive advantages from the research. Address risks \
honestly with mitigation strategies, make strategic concessions to build \
rapport, and push toward deal closure.\n\n\
RESPONSE STYLE:\n\
- Natural executive speech, confident but not arrogant\n\
- Data-driven arguments using specific numbers\n\
- 100-200 words per response, complete thoughts"
    )
}

/// System prompt for the investor (evaluator) agent: a senior partner
/// evaluating the proposal against the firm's criteria.
pub fn investor_system_prompt(investor_name: &str, briefing: &str) -> String {
    format!(
        "You are a senior partner at {investor_name} evaluating a potential \
investment.\n\n\
RESEARCH ON YOUR FIRM (from live web search):\n{briefing}\n\n\
YOUR ROLE:\n\
You are evaluating a company's funding proposal. You represent limited \
partners and must generate returns.\n\n\
Based on the research above, decide what valuation range is acceptable, what \
terms to negotiate, which risks concern you most, and when to push back, \
accept, or walk away. Challenge assumptions with data, reference market \
comparables, and negotiate appropriate protections.\n\n\
RESPONSE STYLE:\n\
- Analytical and questioning, professional skepticism\n\
- Data-focused, push for better terms\n\
- 100-200 words per response, complete thoughts"
    )
}

/// Instruction for turn 1. There is no prior turn to respond to.
pub fn opening_instruction() -> String {
    "=== FIRST TURN: OPENING STATEMENT ===\n\n\
You are about to begin this negotiation. Using the research data in your \
instructions, analyze the current situation, formulate your opening strategy, \
and deliver your opening statement.\n\n\
REQUIREMENTS:\n\
- 150-250 words\n\
- Specific numbers (valuations, amounts, percentages)\n\
- Natural conversational tone\n\
- Complete thought, no truncation\n\n\
Begin your negotiation now."
        .to_string()
}

/// Instruction for every subsequent turn, carrying the recent transcript.
pub fn reply_instruction(recent_transcript: &str, next_turn: u32) -> String {
    format!(
        "=== CONVERSATION SO FAR ===\n{recent_transcript}\n\n\
=== TURN {next_turn}: YOUR RESPONSE ===\n\n\
Analyze the conversation above: understand what the other party just said, \
evaluate their arguments, and formulate your response. Address the specific \
points they raised, use data from your research, adapt your strategy, and \
move the negotiation forward.\n\n\
REQUIREMENTS:\n\
- 100-200 words\n\
- Direct response to their last message\n\
- Specific and substantive, natural tone\n\
- Complete thought\n\n\
Respond now."
    )
}

/// Prompt for the termination judgment. The oracle must answer with a single
/// JSON object matching the schema decoded by [`crate::oracle::parse_judgment`].
pub fn termination_judgment_prompt(window: &str, meta: &SessionMeta) -> String {
    format!(
        "You are analyzing a negotiation between {company} (company) and \
{investor} (investor).\n\n\
RECENT CONVERSATION:\n{window}\n\n\
CONTEXT:\n\
- Turn: {turn_count}\n\
- Minimum substantive turns required: {min_turns}\n\
- Maximum turns allowed: {max_turns}\n\n\
YOUR TASK: Decide whether this negotiation should END now or CONTINUE.\n\n\
1. Has a deal been explicitly accepted? The investor must clearly commit, \
not merely sound interested.\n\
2. Has the deal been explicitly declined? The investor must definitively \
pass on the opportunity.\n\
3. Is the negotiation still productive, or are both sides repeating the \
same arguments?\n\
4. Have they reached an impasse neither side will move from?\n\n\
RESPOND WITH JSON ONLY:\n\
{{\n\
    \"should_end\": true or false,\n\
    \"status\": \"DEAL_ACCEPTED\" | \"DEAL_DECLINED\" | \"ONGOING\" | \"IMPASSE\",\n\
    \"reason\": \"Brief explanation of your decision\",\n\
    \"confidence\": 0.0-1.0\n\
}}\n\n\
If the negotiation is productive and ongoing, set should_end to false. Only \
end on clear acceptance, decline, or unresolvable impasse.",
        company = meta.company,
        investor = meta.investor,
        turn_count = meta.turn_count,
        min_turns = meta.limits.min_turns,
        max_turns = meta.limits.max_turns,
    )
}

/// Prompt for the post-session conclusion analysis.
pub fn conclusion_prompt(transcript: &str, status: TerminationStatus, total_turns: u32) -> String {
    format!(
        "You are a financial analyst evaluating a negotiation that just \
concluded.\n\n\
NEGOTIATION TRANSCRIPT:\n{transcript}\n\n\
STATUS: {status}\n\
TURNS: {total_turns}\n\n\
Analyze this negotiation: the deal outcome and final terms, the quality of \
each side's arguments and tactics, whether the proposed valuations were \
reasonable, the turning points where leverage shifted, and what each party \
could have done better.\n\n\
GENERATE: a comprehensive 400-500 word analysis. Write naturally in \
third person. Use paragraphs, not lists. Be specific and insightful."
    )
}

/// Deterministic conclusion used when the oracle is unavailable.
pub fn fallback_conclusion(meta: &SessionMeta, status: TerminationStatus) -> String {
    format!(
        "NEGOTIATION CONCLUSION\n\n\
Status: {status}\n\
Company: {company}\n\
Investor: {investor}\n\
Total Turns: {turn_count}\n\n\
The negotiation between {company} and {investor} has concluded with status \
{status} after {turn_count} turns of substantive exchange.",
        company = meta.company,
        investor = meta.investor,
        turn_count = meta.turn_count,
    )
}

/// Web-search queries used to build a party's research briefing.
pub fn research_queries(role: Role, name: &str) -> Vec<String> {
    match role {
        Role::Company => vec![
            format!("{name} current market cap stock price"),
            format!("{name} latest earnings revenue growth"),
            format!("{name} competitive advantages market position"),
            format!("{name} latest news developments"),
        ],
        Role::Investor => vec![
            format!("{name} AUM assets under management"),
            format!("{name} investment focus strategy portfolio"),
            format!("{name} recent investments deals"),
        ],
    }
}

/// Prompt that turns raw search results into a negotiation briefing.
pub fn briefing_synthesis_prompt(role: Role, name: &str, raw_results: &str) -> String {
    format!(
        "You are a financial analyst preparing a negotiation briefing on \
{name} (a {role}).\n\n\
RAW WEB SEARCH RESULTS:\n{raw_results}\n\n\
Synthesize these results into a concise factual briefing: current \
valuation or assets, recent performance, strengths, risks, and anything a \
negotiator should know. 200-400 words, plain prose, facts only."
    )
}

/// Briefing used when web search is disabled or returned nothing.
pub fn fallback_briefing(role: Role, name: &str) -> String {
    match role {
        Role::Company => format!(
            "No live research is available for {name}. Negotiate from general \
knowledge of the company: its market position, typical growth-stage \
valuations in its sector, and standard funding-round structures."
        ),
        Role::Investor => format!(
            "No live research is available for {name}. Evaluate the proposal \
from general knowledge of the firm: its typical investment criteria, \
portfolio strategy, and standard institutional deal terms."
        ),
    }
}
