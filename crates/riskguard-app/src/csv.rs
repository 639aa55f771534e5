//! CSV rendering of a risk report.

use riskguard_core::RiskReport;

const HEADER: &str = "Account ID,Ticker,Position Size,Avg Price,Current Price,Stop Price,\
Order Quantity,Locked Profit,At-Risk Profit,Position Value,Currency,\
Locked Profit (Base),At-Risk Profit (Base),Position Value (Base),Base Currency,\
Has Stop Loss,Portfolio %";

/// Render the report's position rows as CSV, one line per position.
#[must_use]
pub fn render_csv(report: &RiskReport) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');

    for risk in &report.position_risks {
        let fields = [
            escape(&risk.account_id),
            escape(&risk.ticker),
            risk.position_size.to_string(),
            risk.avg_price.to_string(),
            risk.current_price.to_string(),
            risk.stop_price.to_string(),
            risk.order_quantity.to_string(),
            risk.locked_profit.to_string(),
            risk.at_risk_profit.to_string(),
            risk.position_value.to_string(),
            escape(risk.currency.as_deref().unwrap_or("")),
            risk.locked_profit_base.to_string(),
            risk.at_risk_profit_base.to_string(),
            risk.position_value_base.to_string(),
            escape(&risk.base_currency),
            risk.has_stop_loss.to_string(),
            risk.portfolio_percentage.to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskguard_core::PositionRisk;
    use rust_decimal_macros::dec;

    fn sample_report() -> RiskReport {
        RiskReport {
            total_position_value: dec!(13500.00),
            worst_case_profit: dec!(1800.00),
            worst_case_profit_with_stop_loss: dec!(1800.00),
            worst_case_profit_without_stop_loss: dec!(0.00),
            total_at_risk_profit: dec!(2700.00),
            currency: "EUR".to_string(),
            unprotected_loss_percentage_used: dec!(50),
            position_risks: vec![PositionRisk {
                account_id: "U1".to_string(),
                ticker: "BRK B, CL A".to_string(),
                position_size: dec!(100),
                avg_price: dec!(100.00),
                current_price: dec!(150.00),
                stop_price: dec!(120.00),
                order_quantity: dec!(100),
                locked_profit: dec!(2000.00),
                at_risk_profit: dec!(3000.00),
                position_value: dec!(15000.00),
                currency: Some("USD".to_string()),
                locked_profit_base: dec!(1800.00),
                at_risk_profit_base: dec!(2700.00),
                position_value_base: dec!(13500.00),
                base_currency: "EUR".to_string(),
                has_stop_loss: true,
                in_profit: true,
                portfolio_percentage: dec!(100.00),
            }],
        }
    }

    #[test]
    fn test_render_csv_has_header_and_rows() {
        let csv = render_csv(&sample_report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Account ID,Ticker,"));
        assert!(lines[1].contains("2000.00"));
        assert!(lines[1].ends_with("true,100.00"));
    }

    #[test]
    fn test_ticker_with_comma_is_quoted() {
        let csv = render_csv(&sample_report());
        assert!(csv.contains("\"BRK B, CL A\""));
    }

    #[test]
    fn test_escape_doubles_quotes() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a\"b"), "\"a\"\"b\"");
        assert_eq!(escape("a,b"), "\"a,b\"");
    }
}
