use serde::Serialize;

use crate::{
    services::{
        alert_service::{self, AlertEvent, FanOutSummary},
        follow_service, fund_service,
    },
    AppState,
};

// tickers per quote request
const QUOTE_CHUNK: usize = 20;

#[derive(Debug, Default, Serialize)]
pub struct PriceCheckSummary {
    pub tickers: usize,
    pub quoted: usize,
    pub quote_errors: usize,
    pub alerts: FanOutSummary,
}

impl PriceCheckSummary {
    fn absorb(&mut self, s: &FanOutSummary) {
        self.alerts.matched += s.matched;
        self.alerts.sent += s.sent;
        self.alerts.skipped_duplicate += s.skipped_duplicate;
        self.alerts.failed += s.failed;
    }
}

/// One pass of the cron job: quote every followed fund and fan out variations.
pub async fn run_price_check(state: &AppState) -> Result<PriceCheckSummary, String> {
    let tickers = follow_service::notifying_tickers(state).await?;

    let mut summary = PriceCheckSummary {
        tickers: tickers.len(),
        ..Default::default()
    };
    if tickers.is_empty() {
        return Ok(summary);
    }

    for chunk in tickers.chunks(QUOTE_CHUNK) {
        let quotes = match state.market.quotes(chunk).await {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(tickers = chunk.len(), error = %e, "quote request failed");
                summary.quote_errors += chunk.len();
                continue;
            }
        };

        for q in quotes {
            let (Some(price), Some(variation)) = (q.regular_market_price, q.regular_market_change_percent) else {
                continue;
            };
            if !price.is_finite() || price <= 0.0 || !variation.is_finite() {
                continue;
            }
            summary.quoted += 1;

            let ticker = q.symbol.to_uppercase();
            if let Err(e) = fund_service::update_quote(state, &ticker, price, variation).await {
                tracing::warn!(ticker = %ticker, error = %e, "fund quote not stored");
            }

            let event = AlertEvent::PriceVariation { ticker: ticker.clone(), price, variation };
            match alert_service::fan_out(state, &event).await {
                Ok(s) => summary.absorb(&s),
                Err(e) => tracing::error!(ticker = %ticker, error = %e, "price fan-out failed"),
            }
        }
    }

    tracing::info!(
        tickers = summary.tickers,
        quoted = summary.quoted,
        sent = summary.alerts.sent,
        "price check finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_accumulate() {
        let mut total = PriceCheckSummary::default();
        total.absorb(&FanOutSummary { matched: 3, sent: 2, skipped_duplicate: 1, failed: 0 });
        total.absorb(&FanOutSummary { matched: 1, sent: 0, skipped_duplicate: 0, failed: 1 });
        assert_eq!(total.alerts, FanOutSummary { matched: 4, sent: 2, skipped_duplicate: 1, failed: 1 });
    }
}
