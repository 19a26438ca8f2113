//! The exec module exposes helpers to execute futures
use async_executor::{LocalExecutor, Task};
use futures_lite::{
    future::{self, block_on},
    Future,
};

#[derive(Clone, Debug, Default)]
/// This executor is local and bounded to the thread that created it, every server connection and
/// client stream spawned through it runs on that thread
pub struct Executor {}

std::thread_local! {
    static EX: LocalExecutor<'static> = const { LocalExecutor::new() };
}

impl Executor {
    pub fn new() -> Self {
        Self {}
    }
    // Spawn a future onto the local executor
    pub fn spawn<T: 'static>(&self, future: impl Future<Output = T> + 'static) -> Task<T> {
        EX.with(|e| e.spawn(future))
    }

    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        EX.with(|e| block_on(e.run(future)))
    }
}

/// helper trait for hyper to spawn future onto a local executor
impl<F> hyper::rt::Executor<F> for Executor
where
    F: future::Future + 'static,
{
    fn execute(&self, fut: F) {
        EX.with(|e| e.spawn(fut)).detach();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use crate::common::exec::Executor;

    #[test_log::test]
    fn test_spawned_tasks_run_on_block_on() {
        let exec = Executor::new();
        let seen = Rc::new(RefCell::new(vec![]));
        hyper::rt::Executor::execute(&exec, {
            let s = seen.clone();
            async move { s.borrow_mut().push(3) }
        });
        let s = seen.clone();
        let task = exec.spawn(async move {
            s.borrow_mut().push(1);
            2
        });
        let out = exec.block_on(task);
        assert_eq!(out, 2);
        exec.block_on(futures_lite::future::yield_now());
        assert!(seen.borrow().contains(&1));
        assert!(seen.borrow().contains(&3));
    }
}
