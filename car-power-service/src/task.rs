use core::convert::Infallible;

use log::info;

use crate::service::Service;

/// Runs the car power management task
pub async fn task(service: &Service<'_>) -> Infallible {
    info!("Starting car power management task");
    loop {
        let task = service.wait_task().await;
        service.process_task(task).await;
    }
}
