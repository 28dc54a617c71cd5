//! Debt-service underwriting for an extracted listing.

use dealscout_common::{ExtractedListing, Underwriting};

#[derive(Debug, Clone, Copy)]
pub struct LoanTerms {
    /// Loan-to-value as a fraction.
    pub ltv: f64,
    /// Annual interest rate, percent.
    pub rate_pct: f64,
    pub amortization_years: u32,
}

impl Default for LoanTerms {
    fn default() -> Self {
        Self {
            ltv: 0.65,
            rate_pct: 6.75,
            amortization_years: 25,
        }
    }
}

impl LoanTerms {
    /// Level monthly payment on a fully amortizing loan, times twelve.
    pub fn annual_debt_service(&self, loan: f64) -> f64 {
        let n = f64::from(self.amortization_years * 12);
        if n == 0.0 {
            return loan;
        }
        let r = self.rate_pct / 100.0 / 12.0;
        let monthly = if r == 0.0 {
            loan / n
        } else {
            loan * r / (1.0 - (1.0 + r).powf(-n))
        };
        monthly * 12.0
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Fill cap rate / NOI from each other when one is missing, then size the
/// loan off price. Fields that cannot be derived stay `None`.
pub fn underwrite(listing: &ExtractedListing, terms: &LoanTerms) -> Underwriting {
    let price = listing.price.filter(|p| *p > 0.0);
    let cap_rate = listing
        .cap_rate
        .or_else(|| Some(listing.noi? / price? * 100.0));
    let noi = listing.noi.or_else(|| Some(price? * cap_rate? / 100.0));

    let loan_amount = price.map(|p| p * terms.ltv);
    let annual_debt_service = loan_amount.map(|l| terms.annual_debt_service(l));
    let dscr = match (noi, annual_debt_service) {
        (Some(noi), Some(ads)) if ads > 0.0 => Some(noi / ads),
        _ => None,
    };

    Underwriting {
        cap_rate: cap_rate.map(round2),
        noi: noi.map(round2),
        loan_amount: loan_amount.map(round2),
        annual_debt_service: annual_debt_service.map(round2),
        dscr: dscr.map(round2),
    }
}
