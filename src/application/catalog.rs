use crate::domain::case::{CaseId, CaseSummary};
use crate::domain::ports::SharedLedger;
use crate::error::Result;

/// Read access to the cases the storefront offers.
pub struct CaseCatalog {
    ledger: SharedLedger,
}

impl CaseCatalog {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    pub async fn list(&self) -> Result<Vec<CaseSummary>> {
        let cases = self.ledger.cases().await?;
        tracing::debug!("catalogue lists {} cases", cases.len());
        Ok(cases)
    }

    /// The catalogue entry for `case_id`, if it is currently offered.
    pub async fn find(&self, case_id: &CaseId) -> Result<Option<CaseSummary>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|case| &case.id == case_id))
    }
}
