/// Picks the columns worth plotting from the markers found in the data file identifier.
///
/// Precedence: open interest, then tick, then close.
/// 1) "openinterest" in the identifier forces the single `openinterest` column
/// 2) "tick" keeps the columns containing "price"
/// 3) otherwise the columns containing "close"
///
/// When exactly 3 columns survive only the first 2 are kept.
/// This cap applies to 3 only, not to 4 or more.
pub fn select_columns(columns: &[String], identifier: &str) -> Vec<String> {
    if identifier.contains("openinterest") {
        return vec!["openinterest".to_string()];
    }
    let marker = if identifier.contains("tick") {
        "price"
    } else {
        "close"
    };
    let mut selected: Vec<String> = columns
        .iter()
        .filter(|c| c.contains(marker))
        .cloned()
        .collect();
    if selected.len() == 3 {
        selected.truncate(2);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn daily_equity_keeps_close() {
        let cols = names(&["open", "high", "low", "close", "volume"]);
        let sel = select_columns(&cols, "data/equity/usa/daily/AAPL.zip");
        assert_eq!(sel, names(&["close"]));
    }

    #[test]
    fn quote_bars_keep_bid_and_ask_close() {
        let cols = names(&[
            "bidopen", "bidhigh", "bidlow", "bidclose", "bidsize", "askopen", "askhigh", "asklow",
            "askclose", "asksize",
        ]);
        let sel = select_columns(&cols, "data/forex/fxcm/minute/eurusd/20160623_quote.zip");
        assert_eq!(sel, names(&["bidclose", "askclose"]));
    }

    #[test]
    fn tick_keeps_price_columns() {
        let cols = names(&["bidprice", "bidsize", "askprice", "asksize"]);
        let sel = select_columns(&cols, "data/equity/usa/tick/spy/20131008_quote.zip");
        assert_eq!(sel, names(&["bidprice", "askprice"]));
    }

    #[test]
    fn exactly_three_is_truncated_to_two() {
        let cols = names(&["bidprice", "askprice", "lastprice", "quantity"]);
        let sel = select_columns(&cols, "tick/x.zip");
        assert_eq!(sel, names(&["bidprice", "askprice"]));

        let cols = names(&["bidclose", "askclose", "close"]);
        assert_eq!(select_columns(&cols, "minute/x.zip"), names(&["bidclose", "askclose"]));
    }

    #[test]
    fn four_matches_are_not_truncated() {
        let cols = names(&["aclose", "bclose", "cclose", "dclose"]);
        assert_eq!(select_columns(&cols, "daily/x.zip").len(), 4);
    }

    #[test]
    fn open_interest_overrides_everything() {
        let cols = names(&["lastprice", "close", "openinterest"]);
        assert_eq!(
            select_columns(&cols, "data/future/tick/openinterest/ES.zip"),
            names(&["openinterest"])
        );
        assert_eq!(
            select_columns(&[], "future/usa/daily/es_openinterest.zip"),
            names(&["openinterest"])
        );
    }

    #[test]
    fn tick_data_ignores_close() {
        let cols = names(&["close", "lastprice"]);
        assert_eq!(select_columns(&cols, "tick/es.zip"), names(&["lastprice"]));
    }
}
