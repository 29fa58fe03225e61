use std::fmt::Write;
use std::sync::Arc;

use axum::{extract::State, response::Html};

use crate::main_lib::AppState;

const EXAMPLE_SYMBOLS: [&str; 2] = ["GOOGL", "AMZN,AAPL,MSFT"];

/// Usage page for those hitting the root URL.
pub async fn help(State(state): State<Arc<AppState>>) -> Html<String> {
    let base = format!("http://{}{}", state.listen_addr, state.scrape_path);

    let mut page = String::new();
    page.push_str("<h1>Prometheus Twelvedata Exporter</h1>");
    page.push_str("<p>To fetch the price of quotes, your URL must be formatted as:</p>");
    let _ = write!(page, "{}?symbols=AAAA,BBBB,CCCC", base);
    page.push_str("<p><b>Examples:</b></p><ul>");
    for symbols in EXAMPLE_SYMBOLS {
        let _ = write!(
            page,
            "<li><a href=\"{base}?symbols={symbols}\">{base}?symbols={symbols}</a></li>"
        );
    }
    page.push_str("</ul>");

    Html(page)
}
