// Payment plumbing
pub mod checksum;
pub mod encryption;

// Wallet payments and gateway notifications
pub mod payments;
pub mod webhooks;

// Tournament play
pub mod disputes;
pub mod match_resolution;
