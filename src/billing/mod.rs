/// Billing: the Credit Gate in front of priced operations, and the
/// payment-intent collaborator used to top balances up.

pub mod gate;
pub mod payments;

pub use gate::{Charge, CreditGate};
pub use payments::{from_config as payment_gateway, PaymentGateway, PaymentIntent, StripeGateway, UnconfiguredGateway};
