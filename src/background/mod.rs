pub mod resilient_subscription;
