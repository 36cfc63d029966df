use driftgc::{allocate, gc, register_root, report, unregister_root, Collectable, Finalize, Gc, Trace, Walker};

enum Node {
    Nil,
    Cons { value: i64, next: Gc<Node> },
}

unsafe impl Trace for Node {
    fn trace(&mut self, walker: &mut dyn Walker) {
        if let Self::Cons { next, .. } = self {
            next.trace(walker);
        }
    }
}

unsafe impl Finalize for Node {}
impl Collectable for Node {}

fn main() {
    let mut head = allocate(Node::Nil);
    for value in 0..8 {
        head = allocate(Node::Cons { value, next: head });
    }
    register_root("head", &mut head);

    gc().expect("collection found a dangling root");
    let mut sum = 0i64;
    let mut cursor = head;
    while let Node::Cons { value, next } = &*cursor {
        sum += value;
        let next = *next;
        cursor = next;
    }
    println!("sum of list survived collection: {}", sum);

    unregister_root(&mut head);
    gc().expect("collection found a dangling root");
    print!("{}", report());
}
