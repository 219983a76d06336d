// Integration tests follow the organization suggested by Matklad:
// https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod simulation_cancellation;
mod simulation_checkpoint;
mod simulation_panic;
