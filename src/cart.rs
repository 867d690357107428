use crate::{
    boundary::ChainExecutor,
    error::{
        CartError,
        ChainError,
    },
    ledger::TxHash,
};
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    warn,
};

/// One contract call waiting to be batched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCall {
    pub contract_address: String,
    pub entrypoint: String,
    pub calldata: Vec<String>,
    #[serde(default)]
    pub metadata: String,
}

impl PendingCall {
    pub fn new(contract_address: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            contract_address: contract_address.into(),
            entrypoint: entrypoint.into(),
            calldata: Vec::new(),
            metadata: String::new(),
        }
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.calldata.push(value.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeAccount {
    pub address: String,
    pub balance: u128,
    /// Accounts the client holds keys for (burners) must cover fees
    /// themselves, so they are checked before submitting.
    pub requires_fee_preflight: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingShortfall {
    pub address: String,
    pub balance: u128,
    pub fee_ceiling: u128,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeOptions {
    pub max_fee: u128,
}

pub fn check_funding(account: &FeeAccount, fee_ceiling: u128) -> Result<(), FundingShortfall> {
    if account.requires_fee_preflight && account.balance < fee_ceiling {
        return Err(FundingShortfall {
            address: account.address.clone(),
            balance: account.balance,
            fee_ceiling,
        });
    }
    Ok(())
}

/// Calls taken out of the cart for a single submission.
#[derive(Debug, PartialEq, Eq)]
pub struct Batch {
    calls: Vec<PendingCall>,
    fee: Option<FeeOptions>,
}

impl Batch {
    pub fn calls(&self) -> &[PendingCall] {
        &self.calls
    }

    pub fn fee(&self) -> Option<&FeeOptions> {
        self.fee.as_ref()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub hash: TxHash,
    pub metadata: Vec<String>,
    pub call_count: usize,
}

#[derive(Debug, Default)]
pub struct TransactionCart {
    calls: Vec<PendingCall>,
    error: Option<String>,
    in_flight: bool,
}

impl TransactionCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call(&mut self, call: PendingCall) {
        debug!(entrypoint = %call.entrypoint, "adding call to cart");
        self.calls.push(call);
    }

    pub fn remove_call(&mut self, call: &PendingCall) -> usize {
        let before = self.calls.len();
        self.calls.retain(|pending| pending != call);
        before - self.calls.len()
    }

    pub fn remove_by_entrypoint(&mut self, entrypoint: &str) -> usize {
        let before = self.calls.len();
        self.calls.retain(|pending| pending.entrypoint != entrypoint);
        before - self.calls.len()
    }

    pub fn calls(&self) -> &[PendingCall] {
        &self.calls
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn reset(&mut self) {
        self.calls.clear();
    }

    /// Takes every pending call as one batch and locks the cart until
    /// `complete_submission` is called. Nothing leaves the cart when the
    /// account needs funding first.
    pub fn begin_submission(
        &mut self,
        account: &FeeAccount,
        fee_ceiling: u128,
    ) -> Result<Batch, CartError> {
        if self.in_flight {
            return Err(CartError::SubmissionInFlight);
        }
        if self.calls.is_empty() {
            return Err(CartError::EmptyCart);
        }
        check_funding(account, fee_ceiling).map_err(CartError::NeedsFunding)?;

        self.in_flight = true;
        let fee = account.requires_fee_preflight.then_some(FeeOptions {
            max_fee: fee_ceiling,
        });
        Ok(Batch {
            calls: std::mem::take(&mut self.calls),
            fee,
        })
    }

    pub fn complete_submission(
        &mut self,
        batch: Batch,
        result: Result<TxHash, ChainError>,
    ) -> Result<Submission, CartError> {
        self.in_flight = false;
        match result {
            Ok(hash) => {
                self.error = None;
                Ok(Submission {
                    hash,
                    call_count: batch.calls.len(),
                    metadata: batch.calls.into_iter().map(|call| call.metadata).collect(),
                })
            }
            Err(err) => {
                warn!(calls = batch.calls.len(), %err, "dropping failed batch");
                self.error = Some(err.message().to_string());
                Err(CartError::Chain(err))
            }
        }
    }

    pub async fn submit<C: ChainExecutor>(
        &mut self,
        account: &FeeAccount,
        fee_ceiling: u128,
        chain: &C,
    ) -> Result<Submission, CartError> {
        let batch = self.begin_submission(account, fee_ceiling)?;
        let result = chain.execute(batch.calls(), batch.fee()).await;
        self.complete_submission(batch, result)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::FakeChain;

    const GAME: &str = "0x0game";

    fn equip(item: u8) -> PendingCall {
        PendingCall::new(GAME, "equip")
            .arg(12)
            .arg(item)
            .with_metadata(format!("Equipping {item}"))
    }

    fn wallet() -> FeeAccount {
        FeeAccount {
            address: "0x0wallet".to_string(),
            balance: 0,
            requires_fee_preflight: false,
        }
    }

    fn burner(balance: u128) -> FeeAccount {
        FeeAccount {
            address: "0x0burner".to_string(),
            balance,
            requires_fee_preflight: true,
        }
    }

    #[tokio::test]
    async fn submit__sends_duplicate_calls_in_one_batch() {
        // given
        let chain = FakeChain::succeeding(TxHash::new([1; 32]));
        let mut cart = TransactionCart::new();
        cart.add_call(equip(3));
        cart.add_call(equip(3));

        // when
        let submission = cart.submit(&wallet(), 100, &chain).await.unwrap();

        // then
        assert_eq!(submission.hash, TxHash::new([1; 32]));
        assert_eq!(submission.call_count, 2);
        assert_eq!(chain.batches(), vec![vec![equip(3), equip(3)]]);
        assert!(cart.calls().is_empty());
        assert!(cart.error().is_none());
        assert!(!cart.is_in_flight());
    }

    #[tokio::test]
    async fn submit__failure_sets_error_and_drops_the_batch() {
        // given
        let chain = FakeChain::failing(ChainError::Unknown("Contract reverted".to_string()));
        let mut cart = TransactionCart::new();
        cart.add_call(equip(1));
        cart.add_call(equip(2));

        // when
        let result = cart.submit(&wallet(), 100, &chain).await;

        // then
        assert_eq!(
            result,
            Err(CartError::Chain(ChainError::Unknown(
                "Contract reverted".to_string()
            )))
        );
        assert_eq!(cart.error(), Some("Contract reverted"));
        assert!(cart.calls().is_empty());
        assert!(!cart.is_in_flight());
    }

    #[tokio::test]
    async fn submit__underfunded_burner_never_reaches_the_chain() {
        // given
        let chain = FakeChain::succeeding(TxHash::new([1; 32]));
        let mut cart = TransactionCart::new();
        cart.add_call(equip(1));

        // when
        let result = cart.submit(&burner(10), 100, &chain).await;

        // then
        assert_eq!(
            result,
            Err(CartError::NeedsFunding(FundingShortfall {
                address: "0x0burner".to_string(),
                balance: 10,
                fee_ceiling: 100,
            }))
        );
        assert_eq!(chain.execute_count(), 0);
        assert_eq!(cart.calls(), &[equip(1)]);
        assert!(!cart.is_in_flight());
    }

    #[tokio::test]
    async fn submit__funded_burner_passes_the_fee_ceiling() {
        // given
        let chain = FakeChain::succeeding(TxHash::new([1; 32]));
        let mut cart = TransactionCart::new();
        cart.add_call(equip(1));

        // when
        cart.submit(&burner(100), 100, &chain).await.unwrap();

        // then
        assert_eq!(chain.fees(), vec![Some(FeeOptions { max_fee: 100 })]);
    }

    #[test]
    fn begin_submission__rejects_reentry_while_in_flight() {
        // given
        let mut cart = TransactionCart::new();
        cart.add_call(equip(1));
        let batch = cart.begin_submission(&wallet(), 100).unwrap();
        cart.add_call(equip(2));

        // when
        let second = cart.begin_submission(&wallet(), 100);

        // then
        assert_eq!(second, Err(CartError::SubmissionInFlight));
        cart.complete_submission(batch, Ok(TxHash::new([2; 32])))
            .unwrap();
        assert_eq!(cart.calls(), &[equip(2)]);
        assert!(cart.begin_submission(&wallet(), 100).is_ok());
    }

    #[test]
    fn begin_submission__rejects_empty_cart() {
        // given
        let mut cart = TransactionCart::new();

        // then
        assert_eq!(
            cart.begin_submission(&wallet(), 100),
            Err(CartError::EmptyCart)
        );
        assert!(!cart.is_in_flight());
    }

    #[test]
    fn remove_by_entrypoint__drops_every_matching_call() {
        // given
        let mut cart = TransactionCart::new();
        cart.add_call(equip(1));
        cart.add_call(PendingCall::new(GAME, "explore").arg(12));
        cart.add_call(equip(2));

        // when
        let removed = cart.remove_by_entrypoint("equip");

        // then
        assert_eq!(removed, 2);
        assert_eq!(cart.calls(), &[PendingCall::new(GAME, "explore").arg(12)]);
    }

    #[test]
    fn remove_call__matches_exact_calls_only() {
        // given
        let mut cart = TransactionCart::new();
        cart.add_call(equip(1));
        cart.add_call(equip(2));

        // when
        let removed = cart.remove_call(&equip(1));

        // then
        assert_eq!(removed, 1);
        assert_eq!(cart.calls(), &[equip(2)]);
    }
}
