pub mod ids;
pub mod task;

pub use ids::{OwnerId, TaskId};
pub use task::{NewTaskRequest, Priority, Task, UpdateTaskRequest};
